//! Arithmetic Tools
//!
//! Two-operand tools the model can compose through nested calls, e.g.
//! `exponents(base: addition(1, 2), power: 2)`.

use async_trait::async_trait;
use serde_json::{Number, Value};

use toolbox_core::{
    Result as CoreResult,
    tool::{Arguments, ParameterSchema, Tool, ToolDefinition},
};

use crate::error::{Result, ToolsError};

/// Read a numeric argument; numeric strings are accepted
pub(crate) fn number_arg(args: &Arguments, name: &str) -> Result<f64> {
    match args.get(name) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolsError::invalid_argument(name, "number out of range")),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ToolsError::invalid_argument(name, format!("'{}' is not a number", s))),
        Some(other) => Err(ToolsError::invalid_argument(
            name,
            format!("expected a number, got {}", other),
        )),
        None => Err(ToolsError::invalid_argument(name, "missing")),
    }
}

fn number_value(value: f64) -> Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or(ToolsError::NonFinite(value))
}

fn binary_definition(name: &str, description: &str, first: (&str, &str), second: (&str, &str)) -> ToolDefinition {
    ToolDefinition::new(name, description)
        .with_parameter(ParameterSchema::new(first.0, "number", first.1).required())
        .with_parameter(ParameterSchema::new(second.0, "number", second.1).required())
        .with_category("math")
}

/// `addition(num1, num2)`
pub struct AdditionTool;

#[async_trait]
impl Tool for AdditionTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition(
            "addition",
            "Calculate the sum of two numbers",
            ("num1", "The first number"),
            ("num2", "The second number"),
        )
    }

    async fn call(&self, args: &Arguments) -> CoreResult<Value> {
        let sum = number_arg(args, "num1")? + number_arg(args, "num2")?;
        Ok(number_value(sum)?)
    }
}

/// `subtraction(num1, num2)` = `num1 - num2`
pub struct SubtractionTool;

#[async_trait]
impl Tool for SubtractionTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition(
            "subtraction",
            "Calculate the difference between two numbers",
            ("num1", "The minuend"),
            ("num2", "The subtrahend"),
        )
    }

    async fn call(&self, args: &Arguments) -> CoreResult<Value> {
        let difference = number_arg(args, "num1")? - number_arg(args, "num2")?;
        Ok(number_value(difference)?)
    }
}

/// `exponents(base, power)` = `base ^ power`
pub struct ExponentsTool;

#[async_trait]
impl Tool for ExponentsTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition(
            "exponents",
            "Calculate the result of a number raised to a power",
            ("base", "The base number"),
            ("power", "The power to which the base is raised"),
        )
    }

    async fn call(&self, args: &Arguments) -> CoreResult<Value> {
        let base = number_arg(args, "base")?;
        let power = number_arg(args, "power")?;
        Ok(number_value(base.powf(power))?)
    }
}
