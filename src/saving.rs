use crate::error::CalcResult;
use crate::registry::CalculationDefinition;

/// Encodes calculations as the JSON list stored in a saved dashboard.
pub fn calculations_to_json(definitions: &[CalculationDefinition]) -> CalcResult<String> {
    Ok(serde_json::to_string_pretty(definitions)?)
}

/// Decodes a saved calculation list, re-parsing every expression.
pub fn calculations_from_json(json: &str) -> CalcResult<Vec<CalculationDefinition>> {
    Ok(serde_json::from_str(json)?)
}
