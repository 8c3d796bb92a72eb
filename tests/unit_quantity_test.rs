use kubalert::core::rules::quantity::parse_quantity_str;

#[tokio::test]
async fn test_parses_cpu_quantities() {
    assert_eq!(parse_quantity_str("250m"), Some(0.25));
    assert_eq!(parse_quantity_str("2"), Some(2.0));
    assert_eq!(parse_quantity_str("1500m"), Some(1.5));
}

#[tokio::test]
async fn test_parses_memory_quantities() {
    assert_eq!(parse_quantity_str("128974848"), Some(128974848.0));
    assert_eq!(parse_quantity_str("64Mi"), Some(64.0 * 1024.0 * 1024.0));
    assert_eq!(
        parse_quantity_str("2Gi"),
        Some(2.0 * 1024.0 * 1024.0 * 1024.0)
    );
    assert_eq!(parse_quantity_str("129M"), Some(129e6));
    assert_eq!(parse_quantity_str("1Ki"), Some(1024.0));
    assert_eq!(parse_quantity_str("3k"), Some(3000.0));
}

#[tokio::test]
async fn test_whitespace_is_tolerated() {
    assert_eq!(parse_quantity_str(" 500m "), Some(0.5));
}

#[tokio::test]
async fn test_rejects_garbage() {
    assert_eq!(parse_quantity_str(""), None);
    assert_eq!(parse_quantity_str("abc"), None);
    assert_eq!(parse_quantity_str("12xyz"), None);
}
