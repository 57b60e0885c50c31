/*!
# Dashboard Calculations

The calculation engine behind an exploratory-data-analysis dashboard builder.

## Overview

Users import tabular data and define derived columns with a small expression
language (`sum_ab = a + b`, `double = sum_ab * 2`). Derived columns may read
raw row fields and other derived columns alike. This crate evaluates those
expressions row by row, keeps track of which calculation reads which, refuses
definitions that would form a dependency cycle, and tells the UI which columns
need refreshing after every change.

## Architecture

- **Row Store** - Immutable rows shared read-only with the import layer, each with a stable id
- **Expression** - Parsed expression text together with the variable names it reads
- **Evaluator** - Produces one value (or a per-row failure) from an expression and a row's bindings
- **Calculation Registry** - Ordered definitions, unique by result column name
- **Dependency Graph** - Direct dependencies per calculation, with precedent/dependent queries
- **Calculation Manager** - Add/update/remove, dependency-ordered execution, per-row result cache

## Key Features

- Arithmetic, comparison and logical operators with best-effort numeric coercion
- Function library: sum, average/mean, median, min, max, standardDeviation, variance,
  round, pow, concat, substring, year/month/day, if and more
- Cycle detection at add/update time
- Row-level fault isolation: a failing row never aborts the rest of a calculation
- Calculation lists serialize as `{resultColumnName, expression}` JSON

## Modules

- **value**: Scalar values and coercion rules
- **row**: Rows, row ids and the shared row store
- **expression**: Expression parsing
- **functions**: Built-in function library
- **evaluator**: Per-row variable binding and evaluation
- **registry**: Calculation definitions and their registry
- **graph**: Dependency graph
- **manager**: Calculation manager
- **config**: Evaluation settings
- **saving**: Saved calculation lists
- **error**: Error types
*/

pub mod config;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod functions;
pub mod graph;
pub mod manager;
pub mod registry;
pub mod row;
pub mod saving;
pub mod value;

/// Re-export everything from these modules to make it easier to use
pub use config::*;
pub use error::*;
pub use evaluator::*;
pub use expression::*;
pub use functions::*;
pub use graph::*;
pub use manager::*;
pub use registry::*;
pub use row::*;
pub use saving::*;
pub use value::*;
