use gridcast::error::{ErrorKind, ForecastError};
use rstest::rstest;
use std::io;

#[test]
fn test_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let forecast_error = ForecastError::from(io_error);
    assert!(matches!(forecast_error, ForecastError::IoError(_)));

    let json_error = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
    assert!(matches!(
        ForecastError::from(json_error),
        ForecastError::Serialization(_)
    ));

    let math_error = grid_math::MathError::InsufficientData("no values".to_string());
    let forecast_error = ForecastError::from(math_error);
    assert!(forecast_error.to_string().contains("no values"));
}

#[test]
fn test_error_display() {
    let error = ForecastError::PreconditionUnmet("calendar ends at 2024-03-14".to_string());
    assert_eq!(
        error.to_string(),
        "Precondition unmet: calendar ends at 2024-03-14"
    );

    let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "permission denied");
    let error_string = ForecastError::from(io_error).to_string();
    assert!(error_string.contains("IO error"));
    assert!(error_string.contains("permission denied"));
}

#[rstest]
#[case::precondition(ForecastError::PreconditionUnmet("x".into()), ErrorKind::PreconditionUnmet, false)]
#[case::telemetry(ForecastError::CollaboratorUnavailable("x".into()), ErrorKind::CollaboratorUnavailable, false)]
#[case::artifact(
    ForecastError::ArtifactLoad { path: "models/lgbm/model.json".into(), reason: "missing".into() },
    ErrorKind::ArtifactLoadFailure,
    true
)]
#[case::history(ForecastError::InsufficientHistory("x".into()), ErrorKind::Failure, true)]
#[case::data(ForecastError::DataError("x".into()), ErrorKind::Failure, true)]
fn test_error_kinds(#[case] error: ForecastError, #[case] kind: ErrorKind, #[case] fatal: bool) {
    assert_eq!(error.kind(), kind);
    assert_eq!(error.is_fatal(), fatal);
}
