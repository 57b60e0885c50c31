use dashboard_calc::{
    CalculationConfig, CalculationDefinition, CalculationError, CalculationManager,
    CalculationUpdate, RowResults, RowStore, Value, parse_expression,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

// Rows [{__ID:1,a:2,b:3},{__ID:2,a:5,b:1}]
fn sample_rows() -> RowStore {
    RowStore::from_json_str(r#"[{"__ID": 1, "a": 2, "b": 3}, {"__ID": 2, "a": 5, "b": 1}]"#)
        .unwrap()
}

fn def(name: &str, text: &str) -> CalculationDefinition {
    CalculationDefinition::parse(name, text).unwrap()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|n| n.to_string()).collect()
}

fn numbers(pairs: &[(u64, f64)]) -> RowResults {
    pairs
        .iter()
        .map(|(id, n)| (*id, Some(Value::Number(*n))))
        .collect()
}

fn failures(ids: &[u64]) -> RowResults {
    ids.iter().map(|id| (*id, None)).collect()
}

fn manager_with_double() -> CalculationManager {
    let mut manager = CalculationManager::new(sample_rows());
    manager.add_calculation(def("sum_ab", "a+b")).unwrap();
    manager.add_calculation(def("double", "sum_ab*2")).unwrap();
    manager
}

#[test]
fn executes_simple_calculation() {
    let mut manager = CalculationManager::new(sample_rows());
    let affected = manager.add_calculation(def("sum_ab", "a+b")).unwrap();
    assert_eq!(affected, names(&["sum_ab"]));

    let sum_ab = manager.get_calculation("sum_ab").unwrap().clone();
    let results = manager.execute_calculation(&sum_ab);
    assert_eq!(results, numbers(&[(1, 5.0), (2, 6.0)]));
    assert_eq!(
        manager.get_calculation_result_for_row("sum_ab", 2),
        Some(&Value::Number(6.0))
    );
    assert_eq!(manager.get_calculation_result_for_row("sum_ab", 3), None);
}

#[test]
fn executing_dependent_populates_precedents() {
    let mut manager = manager_with_double();
    assert!(manager.results("sum_ab").is_none());

    let double = manager.get_calculation("double").unwrap().clone();
    let results = manager.execute_calculation(&double);
    assert_eq!(results, numbers(&[(1, 10.0), (2, 12.0)]));
    assert_eq!(manager.results("sum_ab"), Some(&numbers(&[(1, 5.0), (2, 6.0)])));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut manager = CalculationManager::new(sample_rows());
    manager.add_calculation(def("total", "a+b")).unwrap();

    let err = manager.add_calculation(def("total", "a*b")).unwrap_err();
    assert!(matches!(err, CalculationError::DuplicateName(ref n) if n == "total"));

    let calculations = manager.get_calculations();
    assert_eq!(calculations.len(), 1);
    assert_eq!(calculations[0].expression.raw_input(), "a+b");
    assert_eq!(
        manager.dependency_graph().dependencies("total"),
        Some(&names(&["a", "b"]))
    );
}

#[test]
fn undefined_variable_fails_every_row() {
    let mut manager = CalculationManager::new(sample_rows());
    manager.add_calculation(def("bad", "a + c")).unwrap();

    let bad = manager.get_calculation("bad").unwrap().clone();
    let results = manager.execute_calculation(&bad);
    assert_eq!(results, failures(&[1, 2]));
    assert_eq!(manager.get_calculation_result_for_row("bad", 1), None);
}

#[test]
fn removal_severs_graph_but_not_expression() {
    let mut manager = manager_with_double();
    let double = manager.get_calculation("double").unwrap().clone();
    manager.execute_calculation(&double);

    manager.remove_calculation("sum_ab");

    assert!(manager.get_calculation("sum_ab").is_none());
    assert!(manager.results("sum_ab").is_none());
    assert_eq!(manager.dependency_graph().dependencies("double"), Some(&names(&[])));
    // the parsed expression still names it
    let double = manager.get_calculation("double").unwrap().clone();
    assert!(double.expression.dependencies().contains("sum_ab"));
    // double's own cache is left alone until it runs again
    assert_eq!(manager.results("double"), Some(&numbers(&[(1, 10.0), (2, 12.0)])));

    let results = manager.execute_calculation(&double);
    assert_eq!(results, failures(&[1, 2]));
}

#[test]
fn one_failing_row_does_not_affect_the_others() {
    let rows = RowStore::from_json_str(r#"[{"a": 1, "c": 5}, {"a": 2}, {"a": 3, "c": 1}]"#).unwrap();
    let mut manager = CalculationManager::new(rows);
    manager.add_calculation(def("total", "a + c")).unwrap();

    let total = manager.get_calculation("total").unwrap().clone();
    let results = manager.execute_calculation(&total);

    let mut expected = numbers(&[(1, 6.0), (3, 4.0)]);
    expected.insert(2, None);
    assert_eq!(results, expected);
}

#[test]
fn failed_precedent_rows_propagate_as_failures() {
    let rows = RowStore::from_json_str(r#"[{"a": 1, "c": 5}, {"a": 2}]"#).unwrap();
    let mut manager = CalculationManager::new(rows);
    manager.add_calculation(def("total", "a + c")).unwrap();
    manager.add_calculation(def("scaled", "total * 10")).unwrap();

    let scaled = manager.get_calculation("scaled").unwrap().clone();
    let mut expected = numbers(&[(1, 60.0)]);
    expected.insert(2, None);
    assert_eq!(manager.execute_calculation(&scaled), expected);
}

#[test]
fn execution_is_idempotent() {
    let mut manager = manager_with_double();
    let double = manager.get_calculation("double").unwrap().clone();
    let first = manager.execute_calculation(&double);
    let second = manager.execute_calculation(&double);
    assert_eq!(first, second);
}

#[test]
fn dependents_are_affected_when_their_precedent_is_added_late() {
    let mut manager = CalculationManager::new(sample_rows());
    manager.add_calculation(def("double", "sum_ab*2")).unwrap();
    let affected = manager.add_calculation(def("sum_ab", "a+b")).unwrap();
    assert_eq!(affected, names(&["double", "sum_ab"]));

    let executed = manager.recalculate(&affected);
    assert_eq!(executed, vec!["sum_ab", "double"]);
    assert_eq!(manager.results("double"), Some(&numbers(&[(1, 10.0), (2, 12.0)])));
}

#[test]
fn cycles_are_rejected_without_mutation() {
    let mut manager = manager_with_double();

    let err = manager
        .update_calculation(
            "sum_ab",
            CalculationUpdate::expression(parse_expression("double + 1").unwrap()),
        )
        .unwrap_err();
    match err {
        CalculationError::CyclicDependency(path) => {
            assert_eq!(path, vec!["sum_ab", "double", "sum_ab"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert_eq!(
        manager.get_calculation("sum_ab").unwrap().expression.raw_input(),
        "a+b"
    );

    let err = manager.add_calculation(def("selfish", "selfish + 1")).unwrap_err();
    assert!(matches!(err, CalculationError::CyclicDependency(_)));
    assert!(manager.get_calculation("selfish").is_none());
    assert!(!manager.dependency_graph().contains("selfish"));
}

#[test]
fn parse_errors_surface_and_register_nothing() {
    let mut manager = CalculationManager::new(sample_rows());
    let err = manager.add_calculation_str("broken", "a + (b").unwrap_err();
    assert!(matches!(err, CalculationError::Parse(_)));
    assert!(manager.get_calculations().is_empty());
}

#[test]
fn update_replaces_expression_and_reports_dependents() {
    let mut manager = manager_with_double();
    manager.execute_all();

    let affected = manager
        .update_calculation(
            "sum_ab",
            CalculationUpdate::expression(parse_expression("a - b").unwrap()),
        )
        .unwrap();
    assert_eq!(affected, names(&["double", "sum_ab"]));
    assert!(manager.results("sum_ab").is_none());

    manager.recalculate(&affected);
    assert_eq!(manager.results("sum_ab"), Some(&numbers(&[(1, -1.0), (2, 4.0)])));
    assert_eq!(manager.results("double"), Some(&numbers(&[(1, -2.0), (2, 8.0)])));
}

#[test]
fn rename_keeps_order_and_checks_uniqueness() {
    let mut manager = manager_with_double();
    manager.add_calculation(def("triple", "a*3")).unwrap();

    assert!(matches!(
        manager.update_calculation("sum_ab", CalculationUpdate::rename("triple")),
        Err(CalculationError::DuplicateName(_))
    ));
    assert!(matches!(
        manager.update_calculation("missing", CalculationUpdate::rename("x")),
        Err(CalculationError::UnknownCalculation(_))
    ));

    let affected = manager
        .update_calculation("sum_ab", CalculationUpdate::rename("total"))
        .unwrap();
    assert_eq!(affected, names(&["double", "sum_ab", "total"]));

    let order: Vec<String> = manager
        .get_calculations()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(order, vec!["total", "double", "triple"]);
    assert!(!manager.dependency_graph().contains("sum_ab"));
    assert_eq!(
        manager.dependency_graph().dependencies("total"),
        Some(&names(&["a", "b"]))
    );
}

#[test]
fn preceding_calculations_are_resolved_in_order() {
    let mut manager = manager_with_double();
    manager.add_calculation(def("quad", "double * 2 + a")).unwrap();

    let quad = manager.get_calculation("quad").unwrap().clone();
    let precedents: Vec<String> = manager
        .preceding_calculations(&quad)
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(precedents, vec!["sum_ab", "double"]);

    // unregistered definitions fall back to their own dependency list
    let adhoc = def("adhoc", "sum_ab + missing");
    let precedents = manager.preceding_calculations(&adhoc);
    assert_eq!(precedents.len(), 1);
    assert_eq!(precedents[0].name(), "sum_ab");
}

#[test]
fn computed_columns_shadow_raw_fields() {
    let rows = RowStore::from_json_str(r#"[{"a": 1, "b": 100}]"#).unwrap();
    let mut manager = CalculationManager::new(rows);
    manager.add_calculation(def("b", "a + 1")).unwrap();
    manager.add_calculation(def("c", "b * 10")).unwrap();

    manager.execute_all();
    assert_eq!(manager.get_calculation_result_for_row("c", 1), Some(&Value::Number(20.0)));
}

#[test]
fn replacing_rows_invalidates_results() {
    let mut manager = manager_with_double();
    manager.execute_all();
    assert!(manager.results("double").is_some());

    let rows = RowStore::from_json_str(r#"[{"a": 10, "b": 10}]"#).unwrap();
    manager.replace_rows(rows);
    assert!(manager.results("double").is_none());
    assert_eq!(manager.get_calculations().len(), 2);

    manager.execute_all();
    assert_eq!(manager.results("double"), Some(&numbers(&[(1, 40.0)])));
}

#[test]
fn chunked_evaluation_matches_single_pass() {
    let records: Vec<String> = (0..25)
        .map(|i| format!(r#"{{"a": {}, "b": {}}}"#, i, i * 2))
        .collect();
    let json = format!("[{}]", records.join(","));

    let config = CalculationConfig {
        chunk_size: 4,
        max_logged_failures: 1,
    };
    let mut chunked = CalculationManager::with_config(RowStore::from_json_str(&json).unwrap(), config);
    let mut single = CalculationManager::new(RowStore::from_json_str(&json).unwrap());
    for manager in [&mut chunked, &mut single] {
        manager.add_calculation(def("sum_ab", "a+b")).unwrap();
        manager.execute_all();
    }

    assert_eq!(chunked.results("sum_ab"), single.results("sum_ab"));
    assert_eq!(chunked.results("sum_ab").map(|r| r.len()), Some(25));
}

#[test]
fn previewing_unregistered_definition_leaves_cache_alone() {
    let rows = RowStore::from_json_str(r#"[{"a": 1}]"#).unwrap();
    let mut manager = CalculationManager::new(rows);

    let preview = manager.execute_calculation(&def("a", "100"));
    assert_eq!(preview, numbers(&[(1, 100.0)]));
    assert!(manager.results("a").is_none());

    manager.add_calculation(def("x", "a * 2")).unwrap();
    manager.execute_all();
    assert_eq!(manager.get_calculation_result_for_row("x", 1), Some(&Value::Number(2.0)));
}

#[test]
fn previewing_edited_definition_keeps_registered_results() {
    let mut manager = manager_with_double();
    manager.execute_all();

    let preview = manager.execute_calculation(&def("sum_ab", "a * b"));
    assert_eq!(preview, numbers(&[(1, 6.0), (2, 5.0)]));
    assert_eq!(manager.results("sum_ab"), Some(&numbers(&[(1, 5.0), (2, 6.0)])));
}

#[test]
fn renamed_precedent_fails_dependents_until_they_are_edited() {
    let mut manager = manager_with_double();
    manager.execute_all();

    let affected = manager
        .update_calculation("sum_ab", CalculationUpdate::rename("total"))
        .unwrap();
    assert_eq!(affected, names(&["double", "sum_ab", "total"]));

    let executed = manager.recalculate(&affected);
    assert_eq!(executed, vec!["double", "total"]);
    assert_eq!(manager.results("total"), Some(&numbers(&[(1, 5.0), (2, 6.0)])));
    assert_eq!(manager.results("double"), Some(&failures(&[1, 2])));
    assert_eq!(
        manager.dependency_graph().dependencies("double"),
        Some(&names(&["sum_ab"]))
    );

    // pointing the dependent at the new name heals it
    let affected = manager
        .update_calculation(
            "double",
            CalculationUpdate::expression(parse_expression("total*2").unwrap()),
        )
        .unwrap();
    manager.recalculate(&affected);
    assert_eq!(manager.results("double"), Some(&numbers(&[(1, 10.0), (2, 12.0)])));
}
