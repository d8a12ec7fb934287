//! Loaded settings drive the client and server factories.

use std::io::Write;
use std::time::Duration;

use brisk_client::new_client;
use brisk_config::SettingsLoader;
use brisk_server::new_server;

#[test]
fn file_settings_override_only_what_they_set() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[client]\ntimeout_ms = 900\n\n[server]\naddr = \"127.0.0.1:0\"\nshutdown_grace_period_ms = 12000"
    )
    .unwrap();

    let settings = SettingsLoader::new()
        .with_file(file.path())
        .unwrap()
        .with_env_prefix("BRISK_TEST")
        .load_with_vars(vec![(
            "BRISK_TEST__CLIENT__CONNECT_TIMEOUT_MS".to_string(),
            "150".to_string(),
        )])
        .unwrap();

    let client = new_client(settings.client.options()).unwrap();
    let transport = client.transport().http().unwrap().config();
    assert_eq!(client.timeout(), Duration::from_millis(900));
    assert_eq!(transport.connect_timeout, Some(Duration::from_millis(150)));
    assert_eq!(
        transport.response_header_timeout,
        Some(Duration::from_millis(1500))
    );

    let server = new_server(settings.server.addr(), None, settings.server.options()).unwrap();
    assert_eq!(server.shutdown_grace_period(), Duration::from_secs(12));
    assert_eq!(server.read_timeout(), Duration::from_secs(2));
}
