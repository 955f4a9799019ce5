use std::fmt;

use crate::types::{Command, Pipeline, Redirection};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
	UnexpectedToken(String),
	MissingCommand,
	MultipleInputRedirections,
	MultipleOutputRedirections,
	BackgroundNotLast,
}

impl fmt::Display for ParseError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ParseError::UnexpectedToken(ref t) => {
				write!(f, "syntax error near unexpected token '{}'", t)
			},
			ParseError::MissingCommand => write!(f, "syntax error: missing command"),
			ParseError::MultipleInputRedirections => {
				write!(f, "syntax error: multiple input redirections")
			},
			ParseError::MultipleOutputRedirections => {
				write!(f, "syntax error: multiple output redirections")
			},
			ParseError::BackgroundNotLast => {
				write!(f, "syntax error: & must be at end of command")
			},
		}
	}
}

fn parse_command(tokens: &[String], background: bool) -> Result<Command, ParseError> {
	let mut argv: Vec<String> = vec![];
	let mut redirect = Redirection::default();
	let mut it = tokens.iter();

	while let Some(token) = it.next() {
		match token.as_str() {
			"<" => {
				let target = it
					.next()
					.ok_or_else(|| ParseError::UnexpectedToken(token.clone()))?;
				if redirect.input.is_some() {
					return Err(ParseError::MultipleInputRedirections);
				}
				redirect.input = Some(target.clone());
			},
			">" | ">>" => {
				let target = it
					.next()
					.ok_or_else(|| ParseError::UnexpectedToken(token.clone()))?;
				if redirect.output.is_some() {
					return Err(ParseError::MultipleOutputRedirections);
				}
				redirect.output = Some(target.clone());
				redirect.append = token == ">>";
			},
			"&" => {
				return Err(ParseError::BackgroundNotLast);
			},
			_ => {
				argv.push(token.clone());
			},
		}
	}

	if argv.is_empty() {
		return Err(ParseError::MissingCommand);
	}
	Ok(Command { argv, redirect, background })
}

pub fn parse(tokens: &[String]) -> Result<Pipeline, ParseError> {
	let mut tokens = tokens;
	let mut background = false;
	if tokens.last().map(|t| t.as_str()) == Some("&") {
		background = true;
		tokens = &tokens[..tokens.len() - 1];
	}
	if tokens.is_empty() {
		return Err(ParseError::UnexpectedToken("&".to_string()));
	}

	let mut commands = vec![];
	for segment in tokens.split(|t| t == "|") {
		if segment.is_empty() {
			return Err(ParseError::UnexpectedToken("|".to_string()));
		}
		commands.push(parse_command(segment, background)?);
	}
	Ok(Pipeline { commands, background })
}
