use crate::config::CalculationConfig;
use crate::error::{CalcResult, CalculationError};
use crate::evaluator::{Evaluator, RowContext};
use crate::expression::{Expression, parse_expression};
use crate::graph::DependencyGraph;
use crate::registry::{CalculationDefinition, CalculationRegistry};
use crate::row::{Row, RowId, RowStore};
use crate::saving;
use crate::value::Value;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Cached values of one calculation, keyed by row id. `None` marks a row whose
/// evaluation failed.
pub type RowResults = BTreeMap<RowId, Option<Value>>;

/// Partial replacement applied by [`CalculationManager::update_calculation`].
#[derive(Clone, Debug, Default)]
pub struct CalculationUpdate {
    pub result_column_name: Option<String>,
    pub expression: Option<Expression>,
}

impl CalculationUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        CalculationUpdate {
            result_column_name: Some(name.into()),
            expression: None,
        }
    }

    pub fn expression(expression: Expression) -> Self {
        CalculationUpdate {
            result_column_name: None,
            expression: Some(expression),
        }
    }
}

/// Owns the calculations of one dataset: their definitions, the dependency
/// graph between them and the per-row results.
///
/// Every method runs to completion before returning; callers serialize
/// mutations themselves.
#[derive(Clone, Debug)]
pub struct CalculationManager {
    rows: RowStore,
    registry: CalculationRegistry,
    graph: DependencyGraph,
    results: HashMap<String, RowResults>,
    config: CalculationConfig,
}

impl CalculationManager {
    pub fn new(rows: RowStore) -> Self {
        Self::with_config(rows, CalculationConfig::default())
    }

    pub fn with_config(rows: RowStore, config: CalculationConfig) -> Self {
        CalculationManager {
            rows,
            registry: CalculationRegistry::new(),
            graph: DependencyGraph::new(),
            results: HashMap::new(),
            config,
        }
    }

    /// Rebuilds a manager from a saved calculation list, registering in saved order.
    pub fn from_saved(rows: RowStore, json: &str) -> CalcResult<Self> {
        let mut manager = Self::new(rows);
        for definition in saving::calculations_from_json(json)? {
            manager.add_calculation(definition)?;
        }
        Ok(manager)
    }

    pub fn rows(&self) -> &RowStore {
        &self.rows
    }

    pub fn config(&self) -> &CalculationConfig {
        &self.config
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Swaps in a freshly imported dataset. Every cached result is dropped;
    /// definitions stay registered.
    pub fn replace_rows(&mut self, rows: RowStore) {
        debug!(
            "replacing {} rows with {}, dropping {} cached calculations",
            self.rows.len(),
            rows.len(),
            self.results.len()
        );
        self.rows = rows;
        self.results.clear();
    }

    /// Registers a calculation and returns the columns whose values may change:
    /// the new column plus every calculation already referring to it.
    pub fn add_calculation(&mut self, definition: CalculationDefinition) -> CalcResult<BTreeSet<String>> {
        let name = definition.result_column_name.clone();
        self.registry.validate_new_name(&name)?;
        let dependencies = definition.expression.dependencies().clone();
        if let Some(cycle) = self.graph.cycle_through(&name, &dependencies) {
            return Err(CalculationError::CyclicDependency(cycle));
        }

        self.registry.insert(definition)?;
        self.graph.set(&name, dependencies);
        debug!("added calculation `{}`", name);

        let mut affected = self.graph.dependents(&name);
        affected.insert(name);
        Ok(affected)
    }

    /// Parses `text` and registers it under `name`. Parse failures are returned
    /// unchanged and nothing is registered.
    pub fn add_calculation_str(&mut self, name: &str, text: &str) -> CalcResult<BTreeSet<String>> {
        let expression = parse_expression(text)?;
        self.add_calculation(CalculationDefinition::new(name, expression))
    }

    /// Changes the expression and/or the result column name of `name`.
    pub fn update_calculation(
        &mut self,
        name: &str,
        update: CalculationUpdate,
    ) -> CalcResult<BTreeSet<String>> {
        let current = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| CalculationError::UnknownCalculation(name.to_string()))?;

        let new_name = update
            .result_column_name
            .unwrap_or_else(|| current.result_column_name.clone());
        let renamed = new_name != name;
        if renamed {
            self.registry.validate_new_name(&new_name)?;
        }
        let expression = update.expression.unwrap_or(current.expression);
        let dependencies = expression.dependencies().clone();

        let mut candidate = self.graph.clone();
        candidate.remove_entry(name);
        if let Some(cycle) = candidate.cycle_through(&new_name, &dependencies) {
            return Err(CalculationError::CyclicDependency(cycle));
        }

        let mut affected = self.graph.dependents(name);
        self.registry
            .replace(name, CalculationDefinition::new(new_name.clone(), expression))?;
        candidate.set(&new_name, dependencies);
        self.graph = candidate;
        self.results.remove(name);
        self.results.remove(&new_name);

        if renamed {
            debug!("renamed calculation `{}` to `{}`", name, new_name);
        } else {
            debug!("updated calculation `{}`", name);
        }

        affected.extend(self.graph.dependents(&new_name));
        affected.insert(name.to_string());
        affected.insert(new_name);
        Ok(affected)
    }

    /// Unregisters `name`, drops its results and severs other calculations'
    /// graph references to it. Their own expressions and results are left alone.
    pub fn remove_calculation(&mut self, name: &str) {
        if self.registry.remove(name).is_none() {
            debug!("remove of unknown calculation `{}` ignored", name);
            return;
        }
        self.results.remove(name);
        self.graph.remove(name);
        debug!("removed calculation `{}`", name);
    }

    pub fn get_calculations(&self) -> Vec<CalculationDefinition> {
        self.registry.to_vec()
    }

    pub fn get_calculation(&self, name: &str) -> Option<&CalculationDefinition> {
        self.registry.get(name)
    }

    /// Registered calculations that `definition` transitively depends on,
    /// ordered so each one follows its own precedents. Names that are not
    /// registered calculations are dropped.
    pub fn preceding_calculations(&self, definition: &CalculationDefinition) -> Vec<CalculationDefinition> {
        let name = definition.name();
        let roots = self
            .graph
            .dependencies(name)
            .unwrap_or_else(|| definition.expression.dependencies());
        let mut precedents = self.graph.precedents_of(roots);
        precedents.remove(name);

        self.graph
            .topological_order(&precedents)
            .iter()
            .filter_map(|precedent| self.registry.get(precedent).cloned())
            .collect()
    }

    /// Executes every precedent of `definition` once, then `definition` itself.
    /// Per-row failures are logged and stored as `None`.
    ///
    /// Results are cached only when `definition` is the registered calculation
    /// of that name. Anything else is a preview and leaves the cache untouched,
    /// so it can never shadow a row field for later calculations.
    pub fn execute_calculation(&mut self, definition: &CalculationDefinition) -> RowResults {
        for precedent in self.preceding_calculations(definition) {
            self.run_calculation(&precedent);
        }
        if self.registry.get(definition.name()) == Some(definition) {
            self.run_calculation(definition)
        } else {
            debug!("previewing unregistered calculation `{}`", definition.name());
            self.evaluate_rows(definition)
        }
    }

    /// Executes the registered calculations among `names`, plus any precedents
    /// without cached results, once each in dependency order.
    ///
    /// Returns the names that were executed.
    pub fn recalculate(&mut self, names: &BTreeSet<String>) -> Vec<String> {
        let mut targets: BTreeSet<String> = names
            .iter()
            .filter(|name| self.registry.contains(name))
            .cloned()
            .collect();
        let missing: Vec<String> = targets
            .iter()
            .flat_map(|name| self.graph.precedents(name))
            .filter(|precedent| {
                self.registry.contains(precedent) && !self.results.contains_key(precedent)
            })
            .collect();
        targets.extend(missing);

        let order = self.graph.topological_order(&targets);
        for name in &order {
            if let Some(definition) = self.registry.get(name).cloned() {
                self.run_calculation(&definition);
            }
        }
        order
    }

    pub fn execute_all(&mut self) -> Vec<String> {
        let names: BTreeSet<String> = self.registry.iter().map(|d| d.name().to_string()).collect();
        self.recalculate(&names)
    }

    /// Cached value of `name` for one row. `None` when the calculation has not
    /// run, the row is unknown, or the row failed.
    pub fn get_calculation_result_for_row(&self, name: &str, row_id: RowId) -> Option<&Value> {
        self.results.get(name)?.get(&row_id)?.as_ref()
    }

    pub fn results(&self, name: &str) -> Option<&RowResults> {
        self.results.get(name)
    }

    fn run_calculation(&mut self, definition: &CalculationDefinition) -> RowResults {
        let results = self.evaluate_rows(definition);
        self.results
            .insert(definition.result_column_name.clone(), results.clone());
        results
    }

    fn evaluate_rows(&self, definition: &CalculationDefinition) -> RowResults {
        let name = definition.name();
        let chunk_size = self.config.chunk_size.max(1);
        let mut results = RowResults::new();
        let mut failures = 0usize;

        for (index, chunk) in self.rows.chunks(chunk_size).enumerate() {
            for row in chunk {
                let context = self.row_context(row, name);
                match Evaluator::new(&context).evaluate(&definition.expression) {
                    Ok(value) => {
                        results.insert(row.id, Some(value));
                    }
                    Err(err) => {
                        failures += 1;
                        if failures <= self.config.max_logged_failures {
                            warn!("calculation `{}` failed for row {}: {}", name, row.id, err);
                        }
                        results.insert(row.id, None);
                    }
                }
            }
            trace!(
                "calculation `{}`: {} of {} rows evaluated",
                name,
                (index * chunk_size + chunk.len()).min(self.rows.len()),
                self.rows.len()
            );
        }

        if failures > self.config.max_logged_failures {
            warn!(
                "calculation `{}`: {} further row failures not logged",
                name,
                failures - self.config.max_logged_failures
            );
        }
        debug!(
            "executed calculation `{}` over {} rows ({} failed)",
            name,
            self.rows.len(),
            failures
        );
        results
    }

    /// Row fields plus every other calculation's cached value for the same row.
    fn row_context<'a>(&'a self, row: &'a Row, skip: &str) -> RowContext<'a> {
        let mut context = RowContext::with_capacity(self.results.len() + 8);
        for (calculation, results) in &self.results {
            if calculation != skip {
                let value = results.get(&row.id).and_then(Option::as_ref);
                context.bind_computed(calculation, value);
            }
        }
        for (field, value) in row.fields() {
            context.bind_field(field, value);
        }
        context
    }
}
