use crate::examples::json::json_engine;

#[test]
fn parses_a_flat_object() {
    let mut engine = json_engine();
    let outcome = engine.parse("Json", "{\"a\": 1, \"b\": 2}").unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);

    let value = &outcome.forest[0];
    assert_eq!(value.production, "value");
    assert!(value.contains("object"));

    // Cross-check the pair count against an independent JSON parser.
    let reference: serde_json::Value = serde_json::from_str("{\"a\": 1, \"b\": 2}").unwrap();
    let expected_pairs = reference.as_object().unwrap().len();
    let pairs = value.list(&|m| m.production == "pair");
    assert_eq!(pairs.len(), expected_pairs);
}

#[test]
fn parses_nested_structures() {
    let mut engine = json_engine();
    let source = "{\"items\": [1, 2, 3], \"ok\": true}";
    let outcome = engine.parse("Json", source).unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);

    let value = &outcome.forest[0];
    assert!(value.contains("array"));
    assert!(value.contains("constant"));

    let reference: serde_json::Value = serde_json::from_str(source).unwrap();
    let expected_elements = reference["items"].as_array().unwrap().len();
    let numbers = value.list(&|m| m.production == "number");
    assert_eq!(numbers.len(), expected_elements);
}

#[test]
fn empty_object_and_array() {
    let mut engine = json_engine();
    let outcome = engine.parse("Json", "{}").unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);
    assert!(outcome.forest[0].contains("object"));

    let outcome = engine.parse("Json", "[]").unwrap();
    assert!(outcome.is_success(), "errors: {:?}", outcome.errors);
    assert!(outcome.forest[0].contains("array"));
}

#[test]
fn malformed_json_reports_an_error() {
    let mut engine = json_engine();
    let outcome = engine.parse("Json", "{\"a\": }").unwrap();
    assert!(!outcome.is_success());
}
