use sql_guard::prelude::*;
use sql_guard::test_utils::MockConnector;

fn mock_db(mock: &MockConnector, host: &str) -> Database<MockConnector> {
    Database::new(mock.clone(), ConnectionConfig::new(host, "app", "pw"))
}

#[test]
fn named_instances_are_independent() -> Result<(), Box<dyn std::error::Error>> {
    let primary = MockConnector::new();
    let reporting = MockConnector::new();
    let mut registry = Registry::new();
    registry.register("primary", mock_db(&primary, "db1"));
    registry.register("reporting", mock_db(&reporting, "db2"));

    registry.default_mut()?.execute("SELECT 'primary'")?;
    registry.require_mut("reporting")?.execute("SELECT 'reporting'")?;

    assert_eq!(primary.state().executed, vec!["SELECT 'primary'".to_string()]);
    assert_eq!(reporting.state().executed, vec!["SELECT 'reporting'".to_string()]);
    assert_eq!(
        registry.get("reporting").map(|db| db.config().host.clone()),
        Some("db2".to_string())
    );
    Ok(())
}

#[test]
fn default_can_be_moved_and_removed() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockConnector::new();
    let mut registry = Registry::new();
    registry.register("a", mock_db(&mock, "a"));
    registry.register("b", mock_db(&mock, "b"));
    assert_eq!(registry.default_name(), Some("a"));

    registry.set_default("b")?;
    assert_eq!(registry.default_mut()?.config().host, "b");

    registry.remove("b");
    assert!(matches!(registry.default_mut(), Err(SqlGuardError::ConfigError(_))));
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a"]);
    Ok(())
}

#[test]
fn replacing_an_instance_returns_the_old_one() {
    let mock = MockConnector::new();
    let mut registry = Registry::new();
    assert!(registry.register("main", mock_db(&mock, "old")).is_none());
    let replaced = registry.register("main", mock_db(&mock, "new"));
    assert_eq!(replaced.map(|db| db.config().host.clone()), Some("old".to_string()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn unknown_name_is_a_config_error() {
    let mut registry: Registry<MockConnector> = Registry::new();
    match registry.require_mut("nope") {
        Err(SqlGuardError::ConfigError(message)) => assert!(message.contains("nope")),
        other => panic!("expected config error, got {other:?}"),
    }
    assert!(registry.get_mut("nope").is_none());
}
