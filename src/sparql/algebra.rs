//! SPARQL query algebra
//!
//! The parser lowers query text into this operator tree once per query; the
//! tree is immutable and evaluated recursively by the engine. The query form
//! (SELECT/ASK/CONSTRUCT) is decided here by the parser, never inferred from
//! the shape of evaluation output.

use crate::rdf::{NamedNode, Term};

/// A position in a triple pattern: a concrete term or a query variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern {
    /// Concrete RDF term
    Term(Term),
    /// Query variable, by name (without `?`/`$`)
    Variable(String),
}

impl TermPattern {
    /// The variable name, if this position is a variable
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            TermPattern::Variable(name) => Some(name),
            TermPattern::Term(_) => None,
        }
    }
}

impl From<Term> for TermPattern {
    fn from(term: Term) -> Self {
        TermPattern::Term(term)
    }
}

/// Triple pattern: three positions, each a term or a variable.
///
/// The parser guarantees that a concrete predicate is a named node and a
/// concrete subject is never a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(subject: TermPattern, predicate: TermPattern, object: TermPattern) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Variable names used by this pattern, in position order
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(TermPattern::as_variable)
    }
}

/// Binary operators in FILTER expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

/// Built-in call forms supported in FILTER expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `BOUND(?var)`
    Bound,
    /// `STR(term)`
    Str,
    /// `LANG(literal)`
    Lang,
    /// `DATATYPE(literal)`
    Datatype,
    /// `isIRI(term)` / `isURI(term)`
    IsIri,
    /// `isBLANK(term)`
    IsBlank,
    /// `isLITERAL(term)`
    IsLiteral,
    /// `REGEX(text, pattern [, flags])`
    Regex,
}

/// FILTER / ORDER BY expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Query variable reference
    Variable(String),
    /// Constant term (literal or IRI)
    Term(Term),
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Logical negation
    Not(Box<Expression>),
    /// Unary minus
    Neg(Box<Expression>),
    /// Built-in call
    Call {
        builtin: Builtin,
        args: Vec<Expression>,
    },
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expression,
    pub descending: bool,
}

/// Algebra operator tree
#[derive(Debug, Clone, PartialEq)]
pub enum Algebra {
    /// Match a single triple pattern against the store
    Scan(TriplePattern),
    /// Natural join on shared variable names
    Join(Box<Algebra>, Box<Algebra>),
    /// OPTIONAL: keep left rows even when the right side has no match.
    /// The condition (FILTER written inside the OPTIONAL group) only gates
    /// extensions, never drops left rows.
    LeftJoin {
        left: Box<Algebra>,
        right: Box<Algebra>,
        condition: Option<Expression>,
    },
    /// Concatenation of both branches' solutions
    Union(Box<Algebra>, Box<Algebra>),
    /// Keep solutions where the expression is true; errors discard
    Filter {
        child: Box<Algebra>,
        condition: Expression,
    },
    /// Restrict visible variables
    Project {
        child: Box<Algebra>,
        variables: Vec<String>,
    },
    /// OFFSET/LIMIT
    Slice {
        child: Box<Algebra>,
        offset: usize,
        limit: Option<usize>,
    },
    /// Stable sort on key expressions (the only materializing operator)
    OrderBy {
        child: Box<Algebra>,
        keys: Vec<OrderKey>,
    },
}

impl Algebra {
    /// Variable names bound anywhere in this tree, in first-appearance order
    pub fn in_scope_variables(&self) -> Vec<String> {
        fn walk(node: &Algebra, out: &mut Vec<String>) {
            match node {
                Algebra::Scan(pattern) => {
                    for var in pattern.variables() {
                        if !out.iter().any(|v| v == var) {
                            out.push(var.to_string());
                        }
                    }
                }
                Algebra::Join(l, r) | Algebra::Union(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Algebra::LeftJoin { left, right, .. } => {
                    walk(left, out);
                    walk(right, out);
                }
                Algebra::Filter { child, .. }
                | Algebra::Slice { child, .. }
                | Algebra::OrderBy { child, .. } => walk(child, out),
                Algebra::Project { variables, .. } => {
                    for var in variables {
                        if !out.contains(var) {
                            out.push(var.clone());
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

/// What the query asks for, decided by the parser from the query keyword
#[derive(Debug, Clone, PartialEq)]
pub enum QueryForm {
    /// SELECT with its ordered projection (the eventual `head.vars`)
    Select { variables: Vec<String> },
    /// ASK: non-empty check
    Ask,
    /// CONSTRUCT with its template patterns
    Construct { template: Vec<TriplePattern> },
}

/// A parsed query: form plus the pattern algebra to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub form: QueryForm,
    pub pattern: Algebra,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::NamedNode;

    fn var(name: &str) -> TermPattern {
        TermPattern::Variable(name.to_string())
    }

    #[test]
    fn test_pattern_variables() {
        let pattern = TriplePattern::new(
            var("s"),
            TermPattern::Term(NamedNode::new("http://example.org/p").into()),
            var("o"),
        );
        let vars: Vec<_> = pattern.variables().collect();
        assert_eq!(vars, vec!["s", "o"]);
    }

    #[test]
    fn test_in_scope_variables_dedup_and_order() {
        let scan1 = Algebra::Scan(TriplePattern::new(var("a"), var("p"), var("b")));
        let scan2 = Algebra::Scan(TriplePattern::new(var("b"), var("p"), var("c")));
        let join = Algebra::Join(Box::new(scan1), Box::new(scan2));
        assert_eq!(join.in_scope_variables(), vec!["a", "p", "b", "c"]);
    }
}
