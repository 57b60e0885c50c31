#![cfg(not(tarpaulin_include))]

use dashboard_calc::{
    CalculationConfig, CalculationError, CalculationManager, CalculationUpdate, RowStore,
    calculations_to_json, parse_expression,
};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::time::Instant;

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  list: List calculations");
    println!("  <name>=<expr>: Add a calculation");
    println!("  edit <name>=<expr>: Replace a calculation's expression");
    println!("  rename <old> <new>: Rename a calculation");
    println!("  rm <name>: Remove a calculation");
    println!("  show <name>: Print a calculation's values");
    println!("  save: Print the calculation list as JSON");
}

fn show(manager: &CalculationManager, name: &str) {
    let Some(results) = manager.results(name) else {
        println!("{}: no results", name);
        return;
    };
    println!("__ID\t\t{}", name);
    for (row_id, value) in results {
        match value {
            Some(value) => println!("{:<16}{}", row_id, value),
            None => println!("{:<16}ERR", row_id),
        }
    }
}

fn refresh(manager: &mut CalculationManager, affected: &BTreeSet<String>) {
    for name in manager.recalculate(affected) {
        show(manager, &name);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <rows.json> [config.json]", args[0]);
        return Ok(());
    }

    let rows = RowStore::from_json_str(&fs::read_to_string(&args[1])?)?;
    let config = match args.get(2) {
        Some(path) => CalculationConfig::from_json_str(&fs::read_to_string(path)?)?,
        None => CalculationConfig::default(),
    };
    println!(
        "Loaded {} rows with fields: {}",
        rows.len(),
        rows.field_names().into_iter().collect::<Vec<_>>().join(", ")
    );

    let mut manager = CalculationManager::with_config(rows, config);
    let mut status = String::from("ok");
    let mut start_time = Instant::now();

    loop {
        let elapsed_time = start_time.elapsed().as_secs_f64();
        print!("[{:.1}] ({}) > ", elapsed_time, status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();

        if command.is_empty() {
            status = String::from("invalid command");
            continue;
        }

        let outcome = if command == "q" {
            break;
        } else if command == "help" {
            print_help();
            Ok(None)
        } else if command == "list" {
            for definition in manager.get_calculations() {
                println!("{} = {}", definition.name(), definition.expression);
            }
            Ok(None)
        } else if command == "save" {
            println!("{}", calculations_to_json(&manager.get_calculations())?);
            Ok(None)
        } else if let Some(name) = command.strip_prefix("show ") {
            show(&manager, name.trim());
            Ok(None)
        } else if let Some(name) = command.strip_prefix("rm ") {
            manager.remove_calculation(name.trim());
            Ok(None)
        } else if let Some(rest) = command.strip_prefix("rename ") {
            match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
                [old, new] => manager
                    .update_calculation(old, CalculationUpdate::rename(*new))
                    .map(Some),
                _ => {
                    status = String::from("usage: rename <old> <new>");
                    continue;
                }
            }
        } else if let Some((lhs, formula)) = command.split_once('=') {
            match lhs.trim().strip_prefix("edit ") {
                Some(name) => parse_expression(formula)
                    .map_err(CalculationError::from)
                    .and_then(|expression| {
                        manager.update_calculation(
                            name.trim(),
                            CalculationUpdate::expression(expression),
                        )
                    })
                    .map(Some),
                None => manager.add_calculation_str(lhs.trim(), formula).map(Some),
            }
        } else {
            status = String::from("invalid command");
            continue;
        };

        status = match outcome {
            Ok(Some(affected)) => {
                refresh(&mut manager, &affected);
                String::from("ok")
            }
            Ok(None) => String::from("ok"),
            Err(err) => err.to_string(),
        };
    }

    Ok(())
}
