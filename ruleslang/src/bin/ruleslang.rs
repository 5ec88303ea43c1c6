//! RulesLang command-line interface
//!
//! Usage:
//!   ruleslang                              # Start the interactive shell
//!   ruleslang -f rule.rl -i '{"a": 1}'     # Run a rule file on a JSON input

use std::env;
use std::fs;
use std::process;

use ruleslang::{run_shell, Rule, RuleError};

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut file: Option<String> = None;
    let mut input: Option<String> = None;
    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "-f" | "--file" => {
                if index + 1 >= args.len() {
                    eprintln!("Error: {} requires a path", args[index]);
                    process::exit(1);
                }
                file = Some(args[index + 1].clone());
                index += 2;
            }
            "-i" | "--input" => {
                if index + 1 >= args.len() {
                    eprintln!("Error: {} requires a JSON value", args[index]);
                    process::exit(1);
                }
                input = Some(args[index + 1].clone());
                index += 2;
            }
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("Error: unknown argument '{}'", other);
                print_usage();
                process::exit(1);
            }
        }
    }

    let Some(file) = file else {
        process::exit(run_shell());
    };
    let Some(input) = input else {
        eprintln!("Error: --file requires --input");
        process::exit(1);
    };

    let source = fs::read_to_string(&file).unwrap_or_else(|error| {
        eprintln!("Error: cannot read '{}': {}", file, error);
        process::exit(1);
    });
    let input: serde_json::Value = serde_json::from_str(&input).unwrap_or_else(|error| {
        eprintln!("Error: invalid input JSON: {}", error);
        process::exit(1);
    });

    let rule = match Rule::compile(&source) {
        Ok(rule) => rule,
        Err(error) => {
            eprintln!("{}", error.format_with_source(&source));
            process::exit(1);
        }
    };
    match rule.run(&input) {
        Ok(output) => println!("{}", output),
        Err(RuleError::Source(error)) => {
            eprintln!("{}", error.format_with_source(rule.source()));
            process::exit(1);
        }
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"RulesLang

USAGE:
    ruleslang                        Start the interactive shell
    ruleslang -f <path> -i <json>    Compile and run a rule on a JSON input

OPTIONS:
    -f, --file <path>    Rule source file
    -i, --input <json>   JSON input value (required with --file)
    -h, --help           Show this help message
"#
    );
}
