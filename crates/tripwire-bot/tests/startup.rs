//! Configuration loading and startup failure paths.

use std::io::Write;
use tripwire_bot::{AppConfig, AppError, Application, PriceSource};
use tripwire_exchange::VenueKind;

#[test]
fn test_shipped_default_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
    let config = AppConfig::from_file(path).unwrap();

    assert_eq!(config.exchanges.len(), 2);
    let ascendex = &config.exchanges[0];
    assert_eq!(ascendex.kind, VenueKind::Ascendex);
    assert_eq!(ascendex.connections, 2);
    assert_eq!(ascendex.price_source, PriceSource::Stream);

    let binance = &config.exchanges[1];
    assert_eq!(binance.kind, VenueKind::Binance);
    assert_eq!(binance.key_var(), "BINANCE_API_KEY");
    assert!(binance.engine.insufficient_balance_codes.contains(&-2010));
    assert!(!config.sms.enabled);
}

#[test]
fn test_from_file_reports_missing_and_malformed_files() {
    assert!(matches!(
        AppConfig::from_file("/nonexistent/tripwire.toml"),
        Err(AppError::Config(_))
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[[exchanges]]\nkind = \"kraken\"").unwrap();
    assert!(matches!(
        AppConfig::from_file(file.path().to_str().unwrap()),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_application_requires_an_exchange() {
    assert!(matches!(
        Application::new(AppConfig::default()),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_run_fails_when_no_pipeline_starts() {
    let config = AppConfig::from_toml(
        r#"
        [[exchanges]]
        kind = "binance"
        key_env = "TRIPWIRE_TEST_UNSET_KEY_7f3a"
        secret_env = "TRIPWIRE_TEST_UNSET_SECRET_7f3a"
        "#,
    )
    .unwrap();

    let app = Application::new(config).unwrap();
    let result = tokio_test::block_on(app.run());
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("no exchange pipeline")));
}
