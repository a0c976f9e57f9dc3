//! Front end of the host compiler: build options and entry-point scanning.
//!
//! The host queue does not generate code. "Compiling" a program validates the
//! source structurally, collects its kernel entry points and binds them to
//! host implementations at extraction time.

use kiln_core::{codes, QueueFault};

/// Parsed build options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// `-D NAME[=VALUE]` macro definitions, in order.
    pub defines: Vec<(String, Option<String>)>,
    /// `-I dir` include directories.
    pub include_dirs: Vec<String>,
    /// Any other `-flag`.
    pub flags: Vec<String>,
}

impl BuildOptions {
    /// Value of the last definition of `name`. A bare `-D NAME` yields `""`.
    pub fn define(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }
}

fn options_fault(message: String) -> QueueFault {
    QueueFault::new(codes::INVALID_BUILD_OPTIONS, message)
}

/// Parse a build option string.
pub fn parse_options(options: &str) -> Result<BuildOptions, QueueFault> {
    let mut parsed = BuildOptions::default();
    let mut tokens = options.split_whitespace();

    while let Some(token) = tokens.next() {
        if let Some(rest) = token.strip_prefix("-D") {
            let def = if rest.is_empty() {
                tokens.next().ok_or_else(|| options_fault("-D requires a macro name".into()))?
            } else {
                rest
            };
            let (name, value) = match def.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (def, None),
            };
            if !is_identifier(name) {
                return Err(options_fault(format!("invalid macro name '{}'", name)));
            }
            parsed.defines.push((name.to_string(), value));
        } else if let Some(rest) = token.strip_prefix("-I") {
            let dir = if rest.is_empty() {
                tokens.next().ok_or_else(|| options_fault("-I requires a directory".into()))?
            } else {
                rest
            };
            parsed.include_dirs.push(dir.to_string());
        } else if token.len() > 1 && token.starts_with('-') {
            parsed.flags.push(token.to_string());
        } else {
            return Err(options_fault(format!("unexpected build option '{}'", token)));
        }
    }
    Ok(parsed)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn build_fault(line: usize, message: String) -> QueueFault {
    QueueFault::new(codes::BUILD_PROGRAM_FAILURE, format!("line {}: {}", line, message))
}

/// Replace comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(source: &str) -> Result<String, QueueFault> {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        line += 1;
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                let start = line;
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\n' {
                        out.push('\n');
                        line += 1;
                    } else if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(build_fault(start, "unterminated block comment".into()));
                }
                out.push(' ');
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                out.push(c);
            }
        }
    }
    Ok(out)
}

/// Reject unbalanced `()`, `[]` and `{}`.
fn check_balance(source: &str) -> Result<(), QueueFault> {
    let mut open: Vec<(char, usize)> = Vec::new();
    for (idx, text) in source.lines().enumerate() {
        let line = idx + 1;
        for c in text.chars() {
            match c {
                '(' | '[' | '{' => open.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match open.pop() {
                        Some((o, _)) if o == expected => {}
                        Some((o, at)) => {
                            return Err(build_fault(at, format!("'{}' is closed by '{}' on line {}", o, c, line)))
                        }
                        None => return Err(build_fault(line, format!("unexpected '{}'", c))),
                    }
                }
                _ => {}
            }
        }
    }
    match open.pop() {
        Some((o, at)) => Err(build_fault(at, format!("unclosed '{}'", o))),
        None => Ok(()),
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Ident(&'a str, usize),
    Punct(char),
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    for (idx, text) in source.lines().enumerate() {
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            if c == '_' || c.is_ascii_alphabetic() {
                let end = rest
                    .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
                    .unwrap_or(rest.len());
                tokens.push(Token::Ident(&rest[..end], idx + 1));
                rest = &rest[end..];
            } else {
                if !c.is_whitespace() {
                    tokens.push(Token::Punct(c));
                }
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    tokens
}

/// Validate `source` and return its kernel entry points in declaration order.
///
/// An entry point is `__kernel void <name>(` or `kernel void <name>(`.
pub fn scan_entries(source: &str) -> Result<Vec<String>, QueueFault> {
    let stripped = strip_comments(source)?;
    check_balance(&stripped)?;

    let tokens = tokenize(&stripped);
    let mut entries: Vec<String> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let line = match token {
            Token::Ident("__kernel", line) | Token::Ident("kernel", line) => *line,
            _ => continue,
        };
        match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
            (Some(Token::Ident("void", _)), Some(Token::Ident(name, _)), Some(Token::Punct('('))) => {
                if entries.iter().any(|e| e == name) {
                    return Err(build_fault(line, format!("redefinition of kernel '{}'", name)));
                }
                entries.push(name.to_string());
            }
            _ => return Err(build_fault(line, "kernel entry points must be declared 'void <name>('".into())),
        }
    }
    Ok(entries)
}
