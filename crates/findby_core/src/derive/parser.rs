//! Method name parser: tokenizes an identifier into predicate clauses.
//!
//! # Responsibility
//! - Strip the operation prefix and optional descriptive subject.
//! - Split the predicate on `And`/`Or` at camel-word boundaries.
//! - Strip comparator suffixes and validate field paths against the
//!   schema catalog.
//! - Check the declared parameter list against consumed arity.
//!
//! # Invariants
//! - Comparator arity is fixed (`Between` 2 values, `In` 1 collection,
//!   `IsNull`/`IsNotNull` none, others 1); the parser never guesses
//!   arity from surrounding parameters.
//! - Trailing `Page`/`Sort` parameters are detected by declared kind.
//! - An `_` in the predicate separates relation path segments
//!   (`Team_Name` resolves as `team.name`).

use crate::derive::{DeriveError, DeriveResult, MethodSignature, ParamKind};
use crate::plan::{Comparator, Connector, Operation, PredicateClause, ReturnShape};
use crate::schema::SchemaCatalog;
use once_cell::sync::Lazy;
use regex::Regex;

static METHOD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][A-Za-z0-9_]*$").expect("valid method name regex"));

/// Operation keywords, checked at the start of the method name. The
/// keyword must be followed by an uppercase letter or the end of the
/// name so that e.g. `counter` is not read as a `count` prefix.
const OPERATION_PREFIXES: &[(&str, Operation)] = &[
    ("find", Operation::Find),
    ("get", Operation::Find),
    ("query", Operation::Find),
    ("read", Operation::Find),
    ("count", Operation::Count),
    ("exists", Operation::Exists),
    ("delete", Operation::Delete),
    ("remove", Operation::Delete),
];

/// Comparator suffix table, longest word sequence first.
const COMPARATOR_SUFFIXES: &[(&[&str], Comparator)] = &[
    (&["Greater", "Than", "Equal"], Comparator::GreaterThanEqual),
    (&["Less", "Than", "Equal"], Comparator::LessThanEqual),
    (&["Is", "Not", "Null"], Comparator::IsNotNull),
    (&["Greater", "Than"], Comparator::GreaterThan),
    (&["Less", "Than"], Comparator::LessThan),
    (&["Not", "Null"], Comparator::IsNotNull),
    (&["Is", "Null"], Comparator::IsNull),
    (&["Between"], Comparator::Between),
    (&["Like"], Comparator::Like),
    (&["In"], Comparator::In),
    (&["Not"], Comparator::NotEquals),
    (&["Equals"], Comparator::Equals),
    (&["Equal"], Comparator::Equals),
];

/// Words that only ever appear inside comparator suffixes. A trailing
/// run of these that matches no table entry is an unknown comparator,
/// not a field name.
const COMPARATOR_WORDS: &[&str] = &[
    "Greater", "Less", "Than", "Equal", "Equals", "Not", "Is", "Null", "Like", "Between", "In",
];

/// Parse output: a plan skeleton with validated clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMethod {
    pub name: String,
    pub operation: Operation,
    pub shape: ReturnShape,
    pub clauses: Vec<PredicateClause>,
    pub accepts_page: bool,
    pub accepts_sort: bool,
}

/// Parses one registered method signature against the catalog.
///
/// # Errors
/// - `MalformedMethodName` for grammar violations and clause/parameter
///   count mismatches, with the clause index where one applies.
/// - `UnknownComparator` for unrecognized comparator suffixes.
/// - `UnknownField` when a clause path fails catalog resolution.
pub fn parse(
    entity: &str,
    signature: &MethodSignature,
    catalog: &SchemaCatalog,
) -> DeriveResult<ParsedMethod> {
    let name = signature.name.as_str();
    let malformed = |clause: Option<usize>, message: String| DeriveError::MalformedMethodName {
        method: name.to_string(),
        clause,
        message,
    };

    if !METHOD_NAME_RE.is_match(name) {
        return Err(malformed(
            None,
            "method names start lowercase and contain only ASCII letters, digits and `_`"
                .to_string(),
        ));
    }

    let (operation, rest) = strip_operation_prefix(name)
        .ok_or_else(|| malformed(None, "unrecognized operation prefix".to_string()))?;

    let clauses = match split_subject(rest) {
        SubjectSplit::Predicate(predicate) => {
            if predicate.is_empty() {
                return Err(malformed(None, "empty predicate after `By`".to_string()));
            }
            parse_predicate(entity, name, predicate, catalog)?
        }
        SubjectSplit::MatchAll => Vec::new(),
        SubjectSplit::BadSubject(subject) => {
            return Err(malformed(
                None,
                format!("subject `{subject}` without a `By` clause"),
            ));
        }
    };

    let (accepts_page, accepts_sort) = check_parameters(name, &clauses, &signature.params)?;

    match operation {
        Operation::Find => {
            if matches!(signature.shape, ReturnShape::Page | ReturnShape::Slice) && !accepts_page {
                return Err(malformed(
                    None,
                    "page and slice shapes require a trailing pagination parameter".to_string(),
                ));
            }
            if signature.shape == ReturnShape::One && accepts_page {
                return Err(malformed(
                    None,
                    "single-result methods cannot take a pagination parameter".to_string(),
                ));
            }
        }
        _ => {
            if accepts_page || accepts_sort {
                return Err(malformed(
                    None,
                    "pagination and sort parameters only apply to find methods".to_string(),
                ));
            }
            if signature.shape != ReturnShape::Many {
                return Err(malformed(
                    None,
                    "count/exists/delete methods register with the default shape".to_string(),
                ));
            }
        }
    }

    Ok(ParsedMethod {
        name: name.to_string(),
        operation,
        shape: signature.shape,
        clauses,
        accepts_page,
        accepts_sort,
    })
}

fn strip_operation_prefix(name: &str) -> Option<(Operation, &str)> {
    for (keyword, operation) in OPERATION_PREFIXES {
        if let Some(rest) = name.strip_prefix(keyword) {
            let boundary = rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_uppercase());
            if boundary {
                return Some((*operation, rest));
            }
        }
    }
    None
}

enum SubjectSplit<'a> {
    /// Text after `By`; whatever preceded `By` was a descriptive
    /// subject and is ignored (`findMemberByUsername`).
    Predicate(&'a str),
    /// No `By` and an empty or `All` subject (`findAll`, `count`).
    MatchAll,
    /// No `By` but a non-empty subject; rejected rather than silently
    /// matching everything.
    BadSubject(&'a str),
}

fn split_subject(rest: &str) -> SubjectSplit<'_> {
    let bytes = rest.as_bytes();
    for index in 0..bytes.len() {
        if rest[index..].starts_with("By") {
            let after = &rest[index + 2..];
            if after.is_empty() || after.starts_with(|c: char| c.is_ascii_uppercase()) {
                return SubjectSplit::Predicate(after);
            }
        }
    }
    if rest.is_empty() || rest == "All" {
        SubjectSplit::MatchAll
    } else {
        SubjectSplit::BadSubject(rest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    PathSep,
}

fn tokenize(method: &str, predicate: &str) -> DeriveResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in predicate.chars() {
        if c == '_' {
            if !current.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut current)));
            }
            tokens.push(Token::PathSep);
        } else if c.is_ascii_uppercase() {
            if !current.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut current)));
            }
            current.push(c);
        } else {
            if current.is_empty() {
                return Err(DeriveError::MalformedMethodName {
                    method: method.to_string(),
                    clause: None,
                    message: "predicate words must start with an uppercase letter".to_string(),
                });
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(Token::Word(current));
    }
    Ok(tokens)
}

fn parse_predicate(
    entity: &str,
    method: &str,
    predicate: &str,
    catalog: &SchemaCatalog,
) -> DeriveResult<Vec<PredicateClause>> {
    let tokens = tokenize(method, predicate)?;

    // Split on And/Or connector words. Camel tokenization guarantees a
    // connector word is exactly `And`/`Or`, so `Andrew` or `Order`
    // never split.
    let mut segments: Vec<(Vec<Token>, Option<Connector>)> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    for token in tokens {
        let connector = match &token {
            Token::Word(word) if word == "And" => Some(Connector::And),
            Token::Word(word) if word == "Or" => Some(Connector::Or),
            _ => None,
        };
        match connector {
            Some(connector) => {
                if current.is_empty() {
                    return Err(DeriveError::MalformedMethodName {
                        method: method.to_string(),
                        clause: Some(segments.len()),
                        message: "connector without a preceding condition".to_string(),
                    });
                }
                segments.push((std::mem::take(&mut current), Some(connector)));
            }
            None => current.push(token),
        }
    }
    if current.is_empty() {
        return Err(DeriveError::MalformedMethodName {
            method: method.to_string(),
            clause: Some(segments.len()),
            message: "trailing connector without a condition".to_string(),
        });
    }
    segments.push((current, None));

    let mut clauses = Vec::with_capacity(segments.len());
    for (index, (tokens, connector)) in segments.into_iter().enumerate() {
        let (field_tokens, comparator) = strip_comparator(method, index, tokens)?;
        let path = field_path(method, index, &field_tokens)?;
        catalog
            .lookup(entity, &path)
            .map_err(|source| DeriveError::UnknownField {
                method: method.to_string(),
                clause: index,
                source,
            })?;
        clauses.push(PredicateClause {
            path,
            comparator,
            connector,
        });
    }
    Ok(clauses)
}

fn strip_comparator(
    method: &str,
    clause: usize,
    tokens: Vec<Token>,
) -> DeriveResult<(Vec<Token>, Comparator)> {
    // Trailing run of plain words; a path separator ends the run.
    let trailing: Vec<&str> = tokens
        .iter()
        .rev()
        .map_while(|token| match token {
            Token::Word(word) => Some(word.as_str()),
            Token::PathSep => None,
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    for (suffix, comparator) in COMPARATOR_SUFFIXES {
        if suffix.len() < trailing.len() && trailing.ends_with(suffix) {
            let keep = tokens.len() - suffix.len();
            return Ok((tokens[..keep].to_vec(), *comparator));
        }
    }

    // No match: a trailing run of comparator-only words that does not
    // cover the whole segment cannot be a field name.
    let reserved_run: Vec<&str> = trailing
        .iter()
        .rev()
        .take_while(|word| COMPARATOR_WORDS.contains(*word))
        .copied()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if !reserved_run.is_empty() && reserved_run.len() < trailing.len() {
        return Err(DeriveError::UnknownComparator {
            method: method.to_string(),
            clause,
            suffix: reserved_run.concat(),
        });
    }

    Ok((tokens, Comparator::Equals))
}

fn field_path(method: &str, clause: usize, tokens: &[Token]) -> DeriveResult<String> {
    let malformed = |message: &str| DeriveError::MalformedMethodName {
        method: method.to_string(),
        clause: Some(clause),
        message: message.to_string(),
    };

    let mut segments: Vec<String> = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut flush = |words: &mut Vec<&str>, segments: &mut Vec<String>| -> bool {
        if words.is_empty() {
            return false;
        }
        let mut segment = String::new();
        for (index, word) in words.iter().enumerate() {
            if index == 0 {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    segment.extend(first.to_lowercase());
                    segment.push_str(chars.as_str());
                }
            } else {
                segment.push_str(word);
            }
        }
        segments.push(segment);
        words.clear();
        true
    };

    for token in tokens {
        match token {
            Token::Word(word) => words.push(word.as_str()),
            Token::PathSep => {
                if !flush(&mut words, &mut segments) {
                    return Err(malformed("empty relation path segment"));
                }
            }
        }
    }
    if !flush(&mut words, &mut segments) && segments.is_empty() {
        return Err(malformed("condition has no field name"));
    }
    if segments.is_empty() {
        return Err(malformed("condition has no field name"));
    }
    Ok(segments.join("."))
}

fn check_parameters(
    method: &str,
    clauses: &[PredicateClause],
    params: &[ParamKind],
) -> DeriveResult<(bool, bool)> {
    let mut remaining = params.iter();
    let mut consumed = 0usize;

    for (index, clause) in clauses.iter().enumerate() {
        let malformed = |message: String| DeriveError::MalformedMethodName {
            method: method.to_string(),
            clause: Some(index),
            message,
        };
        if clause.comparator.takes_collection() {
            match remaining.next() {
                Some(ParamKind::ValueList) => consumed += 1,
                Some(other) => {
                    return Err(malformed(format!(
                        "`In` consumes a collection parameter, found {other:?}"
                    )));
                }
                None => {
                    return Err(malformed(format!(
                        "clause needs a collection parameter but only {consumed} parameters were declared"
                    )));
                }
            }
        } else {
            for _ in 0..clause.comparator.value_arity() {
                match remaining.next() {
                    Some(ParamKind::Value) => consumed += 1,
                    Some(other) => {
                        return Err(malformed(format!(
                            "clause consumes a scalar parameter, found {other:?}"
                        )));
                    }
                    None => {
                        return Err(malformed(format!(
                            "clause needs {} value parameter(s) but only {consumed} parameters were declared",
                            clause.comparator.value_arity()
                        )));
                    }
                }
            }
        }
    }

    let mut accepts_page = false;
    let mut accepts_sort = false;
    for kind in remaining {
        let malformed = |message: String| DeriveError::MalformedMethodName {
            method: method.to_string(),
            clause: None,
            message,
        };
        match kind {
            ParamKind::Page if !accepts_page => accepts_page = true,
            ParamKind::Sort if !accepts_sort => accepts_sort = true,
            ParamKind::Page | ParamKind::Sort => {
                return Err(malformed("duplicate trailing pagination/sort parameter".to_string()));
            }
            ParamKind::Value | ParamKind::ValueList => {
                return Err(malformed(format!(
                    "{} parameters declared but clauses only consume {consumed}",
                    params.len()
                )));
            }
        }
    }

    Ok((accepts_page, accepts_sort))
}
