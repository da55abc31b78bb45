//! RDF term definitions
//!
//! Native term model for the triple store: named nodes, blank nodes and
//! literals, plus the subject/object position types built from them.

use std::fmt;
use thiserror::Error;

use super::vocab::xsd;

/// RDF term errors
#[derive(Error, Debug)]
pub enum RdfError {
    /// Invalid literal
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),
}

pub type RdfResult<T> = Result<T, RdfError>;

/// Named node (absolute IRI)
///
/// Equality is plain string equality of the IRI; no relative resolution or
/// normalization is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedNode {
    iri: String,
}

impl NamedNode {
    /// Create a named node from an absolute IRI
    pub fn new(iri: impl Into<String>) -> Self {
        Self { iri: iri.into() }
    }

    /// Get the IRI string
    pub fn as_str(&self) -> &str {
        &self.iri
    }

    /// Consume and return the IRI string
    pub fn into_string(self) -> String {
        self.iri
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.iri)
    }
}

/// Blank node (anonymous resource)
///
/// Identifiers are scoped to one store instance; two blank nodes are equal
/// iff they carry the same id within the same store snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankNode {
    id: String,
}

impl BlankNode {
    /// Create a blank node from a string identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Get the blank node identifier
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

/// RDF literal: a lexical form with an optional datatype IRI or language tag.
///
/// Datatype and language tag are mutually exclusive. A literal with neither
/// is a simple literal and compares as `xsd:string` where a datatype is
/// required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    value: String,
    language: Option<String>,
    datatype: Option<NamedNode>,
}

impl Literal {
    /// Create a simple literal (plain string)
    pub fn new_simple(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    /// Create a literal with a language tag
    pub fn new_language_tagged(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> RdfResult<Self> {
        let language: String = language.into();
        if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(RdfError::InvalidLiteral(format!(
                "invalid language tag: {:?}",
                language
            )));
        }
        Ok(Self {
            value: value.into(),
            language: Some(language.to_ascii_lowercase()),
            datatype: None,
        })
    }

    /// Create a typed literal
    pub fn new_typed(value: impl Into<String>, datatype: NamedNode) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: Some(datatype),
        }
    }

    /// Get the lexical value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the language tag if present
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Get the datatype IRI if the literal carries one
    pub fn datatype(&self) -> Option<&NamedNode> {
        self.datatype.as_ref()
    }

    /// Datatype IRI used for typed comparison, defaulting simple literals to
    /// `xsd:string`. Language-tagged literals have no comparison datatype.
    pub fn effective_datatype(&self) -> Option<&str> {
        if self.language.is_some() {
            None
        } else {
            Some(
                self.datatype
                    .as_ref()
                    .map(NamedNode::as_str)
                    .unwrap_or(xsd::STRING),
            )
        }
    }

    /// Numeric value, when the literal carries a numeric XSD datatype and its
    /// lexical form parses
    pub fn numeric_value(&self) -> Option<f64> {
        let dt = self.datatype.as_ref()?;
        if !xsd::is_numeric(dt.as_str()) {
            return None;
        }
        self.value.trim().parse::<f64>().ok()
    }

    /// Boolean value for `xsd:boolean` literals
    pub fn boolean_value(&self) -> Option<bool> {
        if self.datatype.as_ref().map(NamedNode::as_str) != Some(xsd::BOOLEAN) {
            return None;
        }
        match self.value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.value.chars() {
            match c {
                '\\' => write!(f, "\\\\")?,
                '"' => write!(f, "\\\"")?,
                '\n' => write!(f, "\\n")?,
                '\r' => write!(f, "\\r")?,
                '\t' => write!(f, "\\t")?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")?;
        if let Some(lang) = &self.language {
            write!(f, "@{}", lang)?;
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^{}", dt)?;
        }
        Ok(())
    }
}

/// Triple subject position (named node or blank node)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
}

impl Subject {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, Subject::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, Subject::BlankNode(_))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::NamedNode(n) => write!(f, "{}", n),
            Subject::BlankNode(b) => write!(f, "{}", b),
        }
    }
}

impl From<NamedNode> for Subject {
    fn from(node: NamedNode) -> Self {
        Subject::NamedNode(node)
    }
}

impl From<BlankNode> for Subject {
    fn from(node: BlankNode) -> Self {
        Subject::BlankNode(node)
    }
}

/// Any RDF term (object position, and the value type of query bindings).
///
/// Variant order gives the deterministic fallback ordering used by ORDER BY:
/// blank nodes, then IRIs, then literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// Blank node
    BlankNode(BlankNode),
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Literal value
    Literal(Literal),
}

impl Term {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, Term::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    /// Check if this is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    /// Get as literal if this is one
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// View this term as a triple subject, if it can occupy that position
    pub fn as_subject(&self) -> Option<Subject> {
        match self {
            Term::NamedNode(n) => Some(Subject::NamedNode(n.clone())),
            Term::BlankNode(b) => Some(Subject::BlankNode(b.clone())),
            Term::Literal(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::NamedNode(n) => write!(f, "{}", n),
            Term::BlankNode(b) => write!(f, "{}", b),
            Term::Literal(l) => write!(f, "{}", l),
        }
    }
}

impl From<NamedNode> for Term {
    fn from(node: NamedNode) -> Self {
        Term::NamedNode(node)
    }
}

impl From<BlankNode> for Term {
    fn from(node: BlankNode) -> Self {
        Term::BlankNode(node)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

impl From<Subject> for Term {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::NamedNode(n) => Term::NamedNode(n),
            Subject::BlankNode(b) => Term::BlankNode(b),
        }
    }
}

/// RDF triple (subject-predicate-object)
///
/// The predicate is always a named node; literals and blank nodes cannot
/// occupy that position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    /// Subject
    pub subject: Subject,
    /// Predicate
    pub predicate: NamedNode,
    /// Object
    pub object: Term,
}

impl Triple {
    /// Create a new triple
    pub fn new(
        subject: impl Into<Subject>,
        predicate: NamedNode,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate,
            object: object.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_node() {
        let node = NamedNode::new("http://example.org/alice");
        assert_eq!(node.as_str(), "http://example.org/alice");
        assert_eq!(node.to_string(), "<http://example.org/alice>");
    }

    #[test]
    fn test_blank_node() {
        let b1 = BlankNode::new("b0");
        let b2 = BlankNode::new("b1");
        assert_ne!(b1, b2);
        assert_eq!(b1.to_string(), "_:b0");
    }

    #[test]
    fn test_simple_literal() {
        let lit = Literal::new_simple("Alice");
        assert_eq!(lit.value(), "Alice");
        assert!(lit.datatype().is_none());
        assert_eq!(lit.effective_datatype(), Some(xsd::STRING));
        assert_eq!(lit.to_string(), "\"Alice\"");
    }

    #[test]
    fn test_language_tagged_literal() {
        let lit = Literal::new_language_tagged("Alice", "EN").unwrap();
        assert_eq!(lit.language(), Some("en"));
        assert!(lit.effective_datatype().is_none());
        assert_eq!(lit.to_string(), "\"Alice\"@en");

        assert!(Literal::new_language_tagged("Alice", "").is_err());
        assert!(Literal::new_language_tagged("Alice", "no spaces").is_err());
    }

    #[test]
    fn test_typed_literal() {
        let lit = Literal::new_typed("42", NamedNode::new(xsd::INTEGER));
        assert_eq!(lit.numeric_value(), Some(42.0));
        assert_eq!(
            lit.to_string(),
            "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );

        let not_numeric = Literal::new_typed("42", NamedNode::new(xsd::STRING));
        assert_eq!(not_numeric.numeric_value(), None);

        let garbage = Literal::new_typed("forty-two", NamedNode::new(xsd::INTEGER));
        assert_eq!(garbage.numeric_value(), None);
    }

    #[test]
    fn test_boolean_literal() {
        let lit = Literal::new_typed("true", NamedNode::new(xsd::BOOLEAN));
        assert_eq!(lit.boolean_value(), Some(true));
        let lit = Literal::new_typed("0", NamedNode::new(xsd::BOOLEAN));
        assert_eq!(lit.boolean_value(), Some(false));
    }

    #[test]
    fn test_literal_escaping() {
        let lit = Literal::new_simple("line\n\"quoted\"");
        assert_eq!(lit.to_string(), "\"line\\n\\\"quoted\\\"\"");
    }

    #[test]
    fn test_triple() {
        let triple = Triple::new(
            NamedNode::new("http://example.org/alice"),
            NamedNode::new("http://xmlns.com/foaf/0.1/name"),
            Literal::new_simple("Alice"),
        );
        assert!(triple.subject.is_named_node());
        assert!(triple.object.is_literal());
        assert_eq!(
            triple.to_string(),
            "<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> \"Alice\" ."
        );
    }

    #[test]
    fn test_term_ordering_groups() {
        let b: Term = BlankNode::new("x").into();
        let n: Term = NamedNode::new("http://example.org/x").into();
        let l: Term = Literal::new_simple("x").into();
        assert!(b < n);
        assert!(n < l);
    }
}
