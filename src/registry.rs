use crate::error::{CalcResult, CalculationError, ParseError};
use crate::expression::{Expression, parse_expression};
use serde::{Deserialize, Serialize};

/// A named, expression-derived column.
///
/// Serializes as `{"resultColumnName": ..., "expression": "<source text>"}`;
/// deserializing re-parses the source text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SavedCalculation", into = "SavedCalculation")]
pub struct CalculationDefinition {
    pub result_column_name: String,
    pub expression: Expression,
}

impl CalculationDefinition {
    pub fn new(result_column_name: impl Into<String>, expression: Expression) -> Self {
        CalculationDefinition {
            result_column_name: result_column_name.into(),
            expression,
        }
    }

    pub fn parse(result_column_name: impl Into<String>, text: &str) -> Result<Self, ParseError> {
        Ok(Self::new(result_column_name, parse_expression(text)?))
    }

    pub fn name(&self) -> &str {
        &self.result_column_name
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedCalculation {
    result_column_name: String,
    expression: String,
}

impl TryFrom<SavedCalculation> for CalculationDefinition {
    type Error = ParseError;

    fn try_from(saved: SavedCalculation) -> Result<Self, Self::Error> {
        CalculationDefinition::parse(saved.result_column_name, &saved.expression)
    }
}

impl From<CalculationDefinition> for SavedCalculation {
    fn from(definition: CalculationDefinition) -> Self {
        SavedCalculation {
            expression: definition.expression.raw_input().to_string(),
            result_column_name: definition.result_column_name,
        }
    }
}

/// Calculation definitions in insertion order, unique by result column name.
#[derive(Clone, Debug, Default)]
pub struct CalculationRegistry {
    definitions: Vec<CalculationDefinition>,
}

impl CalculationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&CalculationDefinition> {
        self.definitions.iter().find(|d| d.result_column_name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalculationDefinition> {
        self.definitions.iter()
    }

    pub fn to_vec(&self) -> Vec<CalculationDefinition> {
        self.definitions.clone()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.definitions
            .iter()
            .position(|d| d.result_column_name == name)
    }

    /// Checks that `name` could be registered without a collision.
    pub fn validate_new_name(&self, name: &str) -> CalcResult<()> {
        if name.trim().is_empty() {
            return Err(CalculationError::EmptyName);
        }
        if self.contains(name) {
            return Err(CalculationError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Appends a definition. Leaves the registry untouched on failure.
    pub fn insert(&mut self, definition: CalculationDefinition) -> CalcResult<()> {
        self.validate_new_name(&definition.result_column_name)?;
        self.definitions.push(definition);
        Ok(())
    }

    /// Replaces `name` in place, keeping its position. The replacement may carry a new name.
    pub fn replace(
        &mut self,
        name: &str,
        definition: CalculationDefinition,
    ) -> CalcResult<CalculationDefinition> {
        let index = self
            .position(name)
            .ok_or_else(|| CalculationError::UnknownCalculation(name.to_string()))?;
        if definition.result_column_name != name {
            self.validate_new_name(&definition.result_column_name)?;
        }
        Ok(std::mem::replace(&mut self.definitions[index], definition))
    }

    pub fn remove(&mut self, name: &str) -> Option<CalculationDefinition> {
        self.position(name).map(|index| self.definitions.remove(index))
    }
}
