//! Query results and serialization
//!
//! SELECT and ASK results serialize to the SPARQL 1.1 Query Results JSON
//! format; CONSTRUCT results serialize to N-Triples.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::rdf::{Term, Triple};

/// One query solution: a partial mapping from variable names to terms.
///
/// Insertion-ordered so repeated runs of the same query bind in the same
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySolution {
    bindings: IndexMap<String, Term>,
}

impl QuerySolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable, replacing any previous binding
    pub fn bind(&mut self, variable: impl Into<String>, term: Term) {
        self.bindings.insert(variable.into(), term);
    }

    /// The term bound to a variable, if any
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.bindings.get(variable)
    }

    /// Whether the variable is bound
    pub fn contains(&self, variable: &str) -> bool {
        self.bindings.contains_key(variable)
    }

    /// Iterate (variable, term) bindings in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(v, t)| (v.as_str(), t))
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// A copy keeping only the listed variables, in list order
    pub fn restrict(&self, variables: &[String]) -> QuerySolution {
        let mut out = QuerySolution::new();
        for variable in variables {
            if let Some(term) = self.bindings.get(variable) {
                out.bind(variable.clone(), term.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, Term)> for QuerySolution {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// Evaluated query output, shaped by the query form
#[derive(Debug, Clone, PartialEq)]
pub enum SparqlResults {
    /// SELECT: projected variables plus the solution sequence
    Bindings {
        variables: Vec<String>,
        solutions: Vec<QuerySolution>,
    },
    /// ASK
    Boolean(bool),
    /// CONSTRUCT: deduplicated triples in production order
    Graph(Vec<Triple>),
}

impl SparqlResults {
    /// SPARQL 1.1 JSON results document, for SELECT and ASK results.
    ///
    /// Unbound variables are omitted from their binding objects rather than
    /// serialized as null.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            SparqlResults::Bindings {
                variables,
                solutions,
            } => {
                let bindings: Vec<Value> = solutions
                    .iter()
                    .map(|solution| {
                        let mut obj = Map::new();
                        for variable in variables {
                            if let Some(term) = solution.get(variable) {
                                obj.insert(variable.clone(), term_to_json(term));
                            }
                        }
                        Value::Object(obj)
                    })
                    .collect();
                Some(json!({
                    "head": { "vars": variables },
                    "results": { "bindings": bindings },
                }))
            }
            SparqlResults::Boolean(value) => Some(json!({
                "head": {},
                "boolean": value,
            })),
            SparqlResults::Graph(_) => None,
        }
    }

    /// N-Triples document, for CONSTRUCT results
    pub fn to_ntriples(&self) -> Option<String> {
        match self {
            SparqlResults::Graph(triples) => {
                let mut out = String::new();
                for triple in triples {
                    out.push_str(&triple.to_string());
                    out.push('\n');
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// One RDF term in the JSON results format
fn term_to_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(n) => json!({ "type": "uri", "value": n.as_str() }),
        Term::BlankNode(b) => json!({ "type": "bnode", "value": b.as_str() }),
        Term::Literal(lit) => {
            let mut obj = Map::new();
            obj.insert("type".to_string(), json!("literal"));
            obj.insert("value".to_string(), json!(lit.value()));
            if let Some(lang) = lit.language() {
                obj.insert("xml:lang".to_string(), json!(lang));
            } else if let Some(dt) = lit.datatype() {
                obj.insert("datatype".to_string(), json!(dt.as_str()));
            }
            Value::Object(obj)
        }
    }
}
