//! Demo tools: a clock the model always sees, and a calculator it has to ask for.

use async_trait::async_trait;
use react_core::{AgentError, ParameterSchema, Result, Tool, ToolCall, ToolResult, ToolSchema};

/// Current date and time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        let format = ParameterSchema {
            default: Some(serde_json::json!("human")),
            enum_values: Some(vec![
                serde_json::json!("iso"),
                serde_json::json!("human"),
                serde_json::json!("unix"),
            ]),
            ..ParameterSchema::string("format", "Output format: 'iso', 'human', or 'unix'").optional()
        };
        ToolSchema {
            category: Some("time".into()),
            ..ToolSchema::new("datetime", "Get the current date and time in UTC").param(format)
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let now = chrono::Utc::now();
        let output = match call.str_arg("format").unwrap_or("human") {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        };
        Ok(ToolResult::success("datetime", output))
    }
}

/// Arithmetic over `+ - * / ^`, parentheses and unary minus
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            category: Some("math".into()),
            ..ToolSchema::new("calculate", "Evaluate an arithmetic expression such as (2 + 3) * 4")
                .param(ParameterSchema::string("expression", "The expression to evaluate"))
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let expression = call
            .str_arg("expression")
            .ok_or_else(|| AgentError::ToolValidation("Missing expression".into()))?;
        let value = evaluate(expression)?;
        Ok(ToolResult::success("calculate", format!("{expression} = {value}"))
            .with_data(serde_json::json!({ "result": value })))
    }
}

/// Evaluate `input` with the usual precedence; `^` binds right.
pub fn evaluate(input: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: input.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.chars.len() {
        return Err(parse_error(format!(
            "unexpected '{}' at position {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(AgentError::ToolExecution("result is not a finite number".into()));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err(AgentError::ToolExecution("division by zero".into()));
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64> {
        if self.eat('(') {
            let value = self.expr()?;
            if !self.eat(')') {
                return Err(parse_error("missing ')'".into()));
            }
            return Ok(value);
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => parse_error(format!("unexpected '{c}' at position {start}")),
                None => parse_error("unexpected end of expression".into()),
            });
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| parse_error(format!("bad number '{literal}'")))
    }
}

fn parse_error(msg: String) -> AgentError {
    AgentError::ToolValidation(format!("Invalid expression: {msg}"))
}
