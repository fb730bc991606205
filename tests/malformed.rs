use strangelybrown_bytecode::parser::class_file::{parse_class_file, Error as ParseError};
use strangelybrown_bytecode::proxy::{self, MethodSpec, ProxySpec};
use strangelybrown_bytecode::Error;

/// A generated class ending in a `SourceFile` attribute.
fn supplier() -> Vec<u8> {
    let spec = ProxySpec::new("StringSupplier")
        .implements("java/util/function/Supplier")
        .handler(Default::default())
        .source_file("StringSupplier.java")
        .method(MethodSpec::handled("get", "()Ljava/lang/Object;"));
    proxy::generate_bytes(&spec).unwrap()
}

fn reason(bytes: &[u8]) -> ParseError {
    match parse_class_file(bytes) {
        Err(Error::MalformedClass { offset, reason }) => {
            assert!(offset <= bytes.len(), "offset {} past the input", offset);
            reason
        }
        other => panic!("expected a malformed class, got {:?}", other),
    }
}

#[test]
fn generated_class_parses() {
    assert!(parse_class_file(&supplier()).is_ok());
}

#[test]
fn every_truncation_is_malformed() {
    let bytes = supplier();
    for len in 0..bytes.len() {
        reason(&bytes[..len]);
    }
}

#[test]
fn corrupted_magic() {
    let mut bytes = supplier();
    bytes[3] = 0xBF;
    assert_eq!(reason(&bytes), ParseError::Magic { magic: 0xCAFE_BABF });
}

#[test]
fn unknown_constant_pool_tag() {
    let mut bytes = supplier();
    // the first entry starts right after the pool count
    bytes[10] = 2;
    assert_eq!(reason(&bytes), ParseError::UnknownConstantPoolTag { tag: 2 });
}

#[test]
fn attribute_longer_than_its_contents() {
    let mut bytes = supplier();
    let len = bytes.len();
    // SourceFile: name index, length 2, source file index
    assert_eq!(&bytes[len - 6..len - 2], &[0, 0, 0, 2]);
    bytes[len - 3] = 4;
    bytes.extend_from_slice(&[0, 0]);
    match reason(&bytes) {
        ParseError::AttributeLength { ref attribute_name, attribute_length, .. } => {
            assert_eq!(attribute_name, "SourceFile");
            assert_eq!(attribute_length, 4);
        }
        other => panic!("expected an attribute length error, got {:?}", other),
    }
}

#[test]
fn trailing_garbage() {
    let mut bytes = supplier();
    bytes.extend_from_slice(&[0xCA, 0xFE]);
    assert_eq!(reason(&bytes), ParseError::TrailingBytes { count: 2 });
}

#[test]
fn version_out_of_range() {
    let mut bytes = supplier();
    bytes[6] = 0;
    bytes[7] = 66;
    assert_eq!(reason(&bytes), ParseError::UnsupportedVersion { major: 66, minor: 0 });
}
