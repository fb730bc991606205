//! Entries of the `StackMapTable` attribute (§4.7.4).

use super::super::constant_pool_index;
use super::super::u1;
use super::super::u2;

/// A `StackMapFrame` variant stores a relative bytecode offset, the
/// verification types (§4.10.1.2) for the local variables, and the verification
/// types for the operand stack. Each variant stores a bytecode offset _relative
/// to the previous_ `StackMapFrame`. The actual bytecode offset can be
/// calculated as described in (§4.7.4).
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    SameFrame { offset_delta: u1 },
    SameLocals1StackItemFrame { offset_delta: u1, stack_item: VerificationTypeInfo },
    SameLocals1StackItemFrameExtended { offset_delta: u2, stack_item: VerificationTypeInfo },
    ChopFrame { offset_delta: u2, num_chopped: u1 },
    SameFrameExtended { offset_delta: u2 },
    AppendFrame { offset_delta: u2, locals: Vec<VerificationTypeInfo> },
    FullFrame {
        offset_delta: u2,
        locals: Vec<VerificationTypeInfo>,
        stack: Vec<VerificationTypeInfo>,
    },
}

impl StackMapFrame {
    /// The `frame_type` byte that introduces this frame on the wire, or `None` when a compact
    /// frame holds a delta or count its tag range cannot express.
    pub fn frame_type(&self) -> Option<u1> {
        match *self {
            StackMapFrame::SameFrame { offset_delta } if offset_delta <= 63 => Some(offset_delta),
            StackMapFrame::SameLocals1StackItemFrame { offset_delta, .. } if offset_delta <= 63 => {
                Some(64 + offset_delta)
            }
            StackMapFrame::SameLocals1StackItemFrameExtended { .. } => Some(247),
            StackMapFrame::ChopFrame { num_chopped, .. } if (1..=3).contains(&num_chopped) => {
                Some(251 - num_chopped)
            }
            StackMapFrame::SameFrameExtended { .. } => Some(251),
            StackMapFrame::AppendFrame { ref locals, .. } if (1..=3).contains(&locals.len()) => {
                Some(251 + locals.len() as u1)
            }
            StackMapFrame::FullFrame { .. } => Some(255),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    SameFrame(u1),
    SameLocals1StackItemFrame(u1),
    SameLocals1StackItemFrameExtended,
    ChopFrame(u1),
    SameFrameExtended,
    AppendFrame(u1),
    FullFrame,
    Reserved(u1),
}

impl From<u1> for Tag {
    fn from(t: u1) -> Self {
        match t {
            0..=63 => Tag::SameFrame(t),
            64..=127 => Tag::SameLocals1StackItemFrame(t),
            128..=246 => Tag::Reserved(t),
            247 => Tag::SameLocals1StackItemFrameExtended,
            248..=250 => Tag::ChopFrame(t),
            251 => Tag::SameFrameExtended,
            252..=254 => Tag::AppendFrame(t),
            255 => Tag::FullFrame,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTypeInfo {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Object { class_index: constant_pool_index },
    Uninitialized {
        /// The offset in the `code` array of the `Code` attribute that contains
        /// this `StackMapTable` attribute, of the _new_ instruction that
        /// created the object stored in the location.
        offset: u2,
    },
}

impl VerificationTypeInfo {
    pub fn tag(&self) -> u1 {
        match *self {
            VerificationTypeInfo::Top => 0,
            VerificationTypeInfo::Integer => 1,
            VerificationTypeInfo::Float => 2,
            VerificationTypeInfo::Double => 3,
            VerificationTypeInfo::Long => 4,
            VerificationTypeInfo::Null => 5,
            VerificationTypeInfo::UninitializedThis => 6,
            VerificationTypeInfo::Object { .. } => 7,
            VerificationTypeInfo::Uninitialized { .. } => 8,
        }
    }
}
