//! Embedded analysis language.
//!
//! A small Python-flavoured language over tables: enough of the syntax that
//! generated analysis code uses (assignments, loops, conditionals, f-strings,
//! comprehensions), a pandas-like [`DataFrame`]/[`Series`] model and
//! plotly-express style chart constructors. Charts reach the caller only when
//! captured with `fig.show()` or `plotly_figures.append(fig)`.

mod ast;
mod builtins;
mod error;
mod frame;
mod interp;
mod lexer;
mod ops;
mod parser;
mod value;

use std::collections::BTreeMap;

pub use error::{ScriptError, ScriptResult};
pub use frame::{Column, DataFrame, Series};
pub use interp::Execution;
pub use value::{fmt_float, Builtin, Module, Value};

/// The bindings every execution starts from
pub fn baseline() -> BTreeMap<String, Value> {
    builtins::scope()
}

/// Parse and run `source` against `scope`, stopping after `max_steps` statements
pub fn execute(
    source: &str,
    scope: BTreeMap<String, Value>,
    max_steps: u64,
) -> ScriptResult<Execution> {
    let program = parser::parse(&dedent(source))?;
    interp::Interpreter::new(scope, max_steps).run(&program)
}

/// Check that `source` parses, without running it
pub fn check(source: &str) -> ScriptResult<()> {
    parser::parse(&dedent(source)).map(|_| ())
}

/// Strip the indentation shared by every non-blank line
pub fn dedent(source: &str) -> String {
    let margin = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    source
        .lines()
        .map(|line| line.get(margin..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Execution {
        let mut scope = baseline();
        let frame = DataFrame::from_records(
            vec!["region".into(), "sales".into()],
            &[
                vec!["north".into(), "10".into()],
                vec!["south".into(), "4".into()],
                vec!["north".into(), "7".into()],
            ],
        )
        .unwrap();
        scope.insert("df".into(), Value::Frame(frame));
        execute(source, scope, 10_000).unwrap()
    }

    #[test]
    fn test_dedent_strips_common_margin() {
        assert_eq!(dedent("    a = 1\n\n    if a:\n        b = 2"), "a = 1\n\nif a:\n    b = 2");
        assert_eq!(dedent("x = 1"), "x = 1");
    }

    #[test]
    fn test_mean_of_column() {
        let result = run("print(df['sales'].mean())");
        assert_eq!(result.stdout, "7.0\n");
    }

    #[test]
    fn test_groupby_and_masks() {
        let result = run("\
by_region = df.groupby('region')['sales'].sum()
print(by_region['north'])
big = df[(df['sales'] > 5) & (df['region'] == 'north')]
print(len(big), big.shape)
");
        assert_eq!(result.stdout, "17\n2 [2, 2]\n");
    }

    #[test]
    fn test_column_assignment() {
        let result = run("df['double'] = df['sales'] * 2\nprint(df.columns)\nprint(df.double.max())");
        assert_eq!(result.stdout, "['region', 'sales', 'double']\n20\n");
    }

    #[test]
    fn test_missing_key_message() {
        let err = execute("df['nope']", {
            let mut scope = baseline();
            scope.insert("df".into(), Value::Frame(DataFrame::default()));
            scope
        }, 100)
        .unwrap_err();
        assert_eq!(err.to_string(), "'nope'");
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = check("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.to_string().starts_with("invalid syntax"));
    }
}
