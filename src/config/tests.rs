use super::*;

#[test]
fn test_defaults() {
    let config = HostRegexConfig::default();
    assert!(config.table_regexes.is_empty());
    assert_eq!(config.oob_period, Duration::from_mins(5));
    assert_eq!(config.pool_recheck_period, Duration::from_mins(1));
    assert!(!config.ip_based);
}

#[test]
fn test_from_properties_table_regexes() {
    let props = [
        ("balancer.host.regex.orders", r".*-a\..*"),
        ("balancer.host.regex.events", r".*-b\..*"),
    ];
    let config = HostRegexConfig::from_properties(props).unwrap();
    assert_eq!(config.table_regexes.len(), 2);
    assert_eq!(config.table_regexes["orders"], r".*-a\..*");
    assert_eq!(config.table_regexes["events"], r".*-b\..*");
}

#[test]
fn test_from_properties_reserved_keys() {
    let props = [
        ("balancer.host.regex.oob.period", "10m"),
        ("balancer.host.regex.pool.check", "30s"),
        ("balancer.host.regex.is.ip", "true"),
    ];
    let config = HostRegexConfig::from_properties(props).unwrap();
    assert_eq!(config.oob_period, Duration::from_mins(10));
    assert_eq!(config.pool_recheck_period, Duration::from_secs(30));
    assert!(config.ip_based);
    // The reserved keys must not leak into the regex table.
    assert!(config.table_regexes.is_empty());
}

#[test]
fn test_from_properties_ignores_foreign_keys() {
    let props = [
        ("table.split.threshold", "1G"),
        ("master.port.client", "9999"),
        ("balancer.host.regex.orders", ".*"),
    ];
    let config = HostRegexConfig::from_properties(props).unwrap();
    assert_eq!(config.table_regexes.len(), 1);
}

#[test]
fn test_from_properties_bad_duration_is_fatal() {
    let props = [("balancer.host.regex.oob.period", "soon")];
    let err = HostRegexConfig::from_properties(props).unwrap_err();
    assert!(matches!(err, Error::BadConfig(_)));
}

#[test]
fn test_from_properties_bad_bool_is_fatal() {
    let props = [("balancer.host.regex.is.ip", "yes")];
    let err = HostRegexConfig::from_properties(props).unwrap_err();
    assert!(matches!(err, Error::BadConfig(_)));
}

#[test]
fn test_deserialize_from_toml() {
    let toml = r#"
        ip_based = true
        oob_period = "10m"
        pool_recheck_period = 5000

        [table_regexes]
        orders = '.*-a\..*'
    "#;
    let config: HostRegexConfig = toml::from_str(toml).unwrap();
    assert!(config.ip_based);
    assert_eq!(config.oob_period, Duration::from_mins(10));
    assert_eq!(config.pool_recheck_period, Duration::from_millis(5000));
    assert_eq!(config.table_regexes["orders"], r".*-a\..*");
}

#[test]
fn test_deserialize_empty_uses_defaults() {
    let config: HostRegexConfig = toml::from_str("").unwrap();
    assert_eq!(config, HostRegexConfig::default());
}
