//! Tests for error handling

use std::io;

use corograft_core::error::{AppendStage, CoreError, CoreResult, ParseError};

#[test]
fn test_format_error_display()
{
    let error = CoreError::Format("no note segment".to_string());
    assert_eq!(error.to_string(), "Invalid core file: no note segment");
}

#[test]
fn test_io_error_conversion()
{
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
    let error: CoreError = io_err.into();
    match error {
        CoreError::Io(ref inner) => assert_eq!(inner.kind(), io::ErrorKind::PermissionDenied),
        _ => panic!("Expected Io variant"),
    }
    assert!(error.to_string().contains("denied"));
}

#[test]
fn test_append_stage_display()
{
    assert_eq!(AppendStage::NotePayload.to_string(), "note payload");
    assert_eq!(AppendStage::ThreadRecord(3).to_string(), "thread record #3");
    assert_eq!(AppendStage::Descriptor.to_string(), "note descriptor");
}

#[test]
fn test_append_failed_display()
{
    let error = CoreError::AppendFailed {
        stage: AppendStage::ThreadRecord(0),
        source: io::Error::new(io::ErrorKind::Other, "disk full"),
    };
    let message = error.to_string();
    assert!(message.contains("thread record #0"));
    assert!(message.contains("disk full"));
}

#[test]
fn test_rollback_failed_display_mentions_both_errors()
{
    let error = CoreError::RollbackFailed {
        stage: AppendStage::Descriptor,
        source: io::Error::new(io::ErrorKind::Other, "disk full"),
        rollback: io::Error::new(io::ErrorKind::Other, "read-only filesystem"),
    };
    let message = error.to_string();
    assert!(message.contains("note descriptor"));
    assert!(message.contains("disk full"));
    assert!(message.contains("rollback also failed: read-only filesystem"));
}

#[test]
fn test_append_failed_exposes_source()
{
    use std::error::Error;

    let error = CoreError::AppendFailed {
        stage: AppendStage::NotePayload,
        source: io::Error::new(io::ErrorKind::Other, "disk full"),
    };
    assert_eq!(error.source().map(ToString::to_string), Some("disk full".to_string()));
}

#[test]
fn test_resource_error_display()
{
    let error = CoreError::Resource { size: 1 << 40 };
    assert!(error.to_string().contains("1099511627776"));
}

#[test]
fn test_parse_error_conversion()
{
    let error: CoreError = ParseError::UnknownRegister("FOO".to_string()).into();
    assert_eq!(error.to_string(), "Parse error: unknown register `FOO`");
}

#[test]
fn test_parse_error_display()
{
    assert_eq!(
        ParseError::MissingSeparator("RIP".to_string()).to_string(),
        "expected NAME:VALUE, found `RIP`"
    );
    assert_eq!(
        ParseError::InvalidValue {
            register: "RSP".to_string(),
            value: "0xzz".to_string(),
        }
        .to_string(),
        "invalid value `0xzz` for register RSP"
    );
}

#[test]
fn test_session_consumed_display()
{
    assert!(CoreError::SessionConsumed.to_string().contains("already consumed"));
}

#[test]
fn test_core_result_alias()
{
    fn fails() -> CoreResult<u32>
    {
        Err(CoreError::SessionConsumed)
    }
    assert!(fails().is_err());
}
