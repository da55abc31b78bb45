//! SPARQL parser
//!
//! Parses query text with a pest grammar (`sparql.pest`) and lowers the parse
//! tree into the [`Algebra`](super::algebra::Algebra) operator tree. The
//! grammar also recognizes common out-of-subset constructs (property paths,
//! aggregates, subqueries, ...) so they can be rejected with a named
//! [`ParseError::Unsupported`] instead of a generic syntax error.

use indexmap::IndexMap;
use pest::iterators::Pair;
use pest::Parser;
use thiserror::Error;

use crate::rdf::vocab::{rdf, xsd};
use crate::rdf::{Literal, NamedNode, NamespaceManager, Term};

use super::algebra::{
    Algebra, BinaryOp, Builtin, Expression, OrderKey, Query, QueryForm, TermPattern, TriplePattern,
};

#[derive(pest_derive::Parser)]
#[grammar = "sparql/sparql.pest"]
struct SparqlGrammar;

/// Query parsing errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// The query text does not match the grammar
    #[error("syntax error: {0}")]
    Syntax(Box<pest::error::Error<Rule>>),

    /// The query is grammatical but outside the supported subset
    #[error("unsupported SPARQL feature: {0}")]
    Unsupported(String),

    /// A prefixed name uses a prefix bound neither in the prologue nor in
    /// the store
    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),

    /// The query is grammatical but malformed (bad arity, empty group, ...)
    #[error("invalid query: {0}")]
    Semantic(String),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        ParseError::Syntax(Box::new(e))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Blank node labels in queries act as non-distinguished variables. Their
/// internal names carry a `:` so they can never collide with parsed
/// variable names, and `SELECT *` skips them.
fn bnode_variable(label: &str) -> String {
    format!(":{}", label)
}

/// Whether a variable name is an internal blank-node variable
pub(super) fn is_bnode_variable(name: &str) -> bool {
    name.starts_with(':')
}

/// Parse a query against a prefix table (prologue declarations take
/// precedence over store-bound prefixes).
pub fn parse_query(input: &str, namespaces: &NamespaceManager) -> ParseResult<Query> {
    let mut pairs = SparqlGrammar::parse(Rule::query, input)?;
    let query = take_next(&mut pairs, "query")?;

    let mut builder = QueryBuilder {
        prefixes: IndexMap::new(),
        namespaces,
    };
    builder.build(query)
}

/// Walks the parse tree and lowers it to a [`Query`]
struct QueryBuilder<'a> {
    /// Prologue PREFIX declarations, in declaration order
    prefixes: IndexMap<String, String>,
    /// Store-bound prefixes, used as fallback
    namespaces: &'a NamespaceManager,
}

/// Pattern algebra and top-level FILTER conditions of one group, kept apart
/// so OPTIONAL can hoist the inner filters into the left join condition.
struct GroupParts {
    pattern: Option<Algebra>,
    filters: Vec<Expression>,
}

impl GroupParts {
    /// The group's algebra with its filters applied on top
    fn into_algebra(self) -> ParseResult<Algebra> {
        let mut algebra = self
            .pattern
            .ok_or_else(|| ParseError::Semantic("empty group pattern".to_string()))?;
        for condition in self.filters {
            algebra = Algebra::Filter {
                child: Box::new(algebra),
                condition,
            };
        }
        Ok(algebra)
    }
}

impl QueryBuilder<'_> {
    fn build(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Query> {
        // query children: prologue, form, EOI
        let mut query = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::prologue => self.prologue(child)?,
                Rule::select_query => query = Some(self.select_query(child)?),
                Rule::ask_query => query = Some(self.ask_query(child)?),
                Rule::construct_query => query = Some(self.construct_query(child)?),
                Rule::describe_query => {
                    return Err(ParseError::Unsupported("DESCRIBE queries".to_string()))
                }
                Rule::EOI => {}
                rule => return Err(malformed(rule)),
            }
        }
        query.ok_or_else(|| ParseError::Semantic("missing query form".to_string()))
    }

    fn prologue(&mut self, pair: Pair<'_, Rule>) -> ParseResult<()> {
        for decl in pair.into_inner() {
            match decl.as_rule() {
                Rule::prefix_decl => {
                    let mut inner = decl.into_inner();
                    let ns = take_next(&mut inner, "prefix declaration")?;
                    let iri = take_next(&mut inner, "prefix declaration")?;
                    let prefix = ns.as_str().trim_end_matches(':');
                    self.prefixes
                        .insert(prefix.to_string(), strip_iri_ref(iri.as_str()));
                }
                Rule::base_decl => {
                    return Err(ParseError::Unsupported("BASE declarations".to_string()))
                }
                rule => return Err(malformed(rule)),
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Query forms

    fn select_query(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Query> {
        let mut projection = None;
        let mut pattern = None;
        let mut modifier = SolutionModifier::default();

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::distinct_modifier => {
                    return Err(ParseError::Unsupported(format!(
                        "SELECT {}",
                        child.as_str().to_ascii_uppercase()
                    )))
                }
                Rule::select_projection => projection = Some(self.projection(child)?),
                Rule::where_clause => pattern = Some(self.where_clause(child)?),
                Rule::solution_modifier => modifier = self.solution_modifier(child)?,
                rule => return Err(malformed(rule)),
            }
        }

        let pattern = pattern.ok_or_else(|| ParseError::Semantic("missing WHERE".to_string()))?;
        let pattern = modifier.order(pattern);

        // `SELECT *` projects every visible variable, skipping blank-node
        // variables
        let variables = match projection {
            Some(Projection::Star) | None => pattern
                .in_scope_variables()
                .into_iter()
                .filter(|v| !is_bnode_variable(v))
                .collect(),
            Some(Projection::Variables(vars)) => vars,
        };

        let pattern = Algebra::Project {
            child: Box::new(pattern),
            variables: variables.clone(),
        };

        Ok(Query {
            form: QueryForm::Select { variables },
            pattern: modifier.slice(pattern),
        })
    }

    fn ask_query(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Query> {
        let mut pattern = None;
        let mut modifier = SolutionModifier::default();
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::where_clause => pattern = Some(self.where_clause(child)?),
                Rule::solution_modifier => modifier = self.solution_modifier(child)?,
                rule => return Err(malformed(rule)),
            }
        }
        let pattern = pattern.ok_or_else(|| ParseError::Semantic("missing pattern".to_string()))?;
        Ok(Query {
            form: QueryForm::Ask,
            pattern: modifier.slice(modifier.order(pattern)),
        })
    }

    fn construct_query(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Query> {
        let mut template = Vec::new();
        let mut pattern = None;
        let mut modifier = SolutionModifier::default();

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::construct_template => {
                    for block in child.into_inner() {
                        template.extend(self.triples_block(block)?);
                    }
                }
                Rule::where_clause => pattern = Some(self.where_clause(child)?),
                Rule::solution_modifier => modifier = self.solution_modifier(child)?,
                rule => return Err(malformed(rule)),
            }
        }

        let pattern = pattern.ok_or_else(|| ParseError::Semantic("missing WHERE".to_string()))?;
        Ok(Query {
            form: QueryForm::Construct { template },
            pattern: modifier.slice(modifier.order(pattern)),
        })
    }

    fn projection(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Projection> {
        let mut variables = Vec::new();
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::star => return Ok(Projection::Star),
                Rule::select_item => {
                    let inner = first_inner(item)?;
                    match inner.as_rule() {
                        Rule::var => {
                            let name = variable_name(inner)?;
                            if variables.contains(&name) {
                                return Err(ParseError::Semantic(format!(
                                    "variable ?{} projected twice",
                                    name
                                )));
                            }
                            variables.push(name);
                        }
                        Rule::aggregate => {
                            return Err(ParseError::Unsupported(
                                "aggregate functions".to_string(),
                            ))
                        }
                        Rule::paren_projection => {
                            // `(COUNT(?s) AS ?n)` and friends are aggregates
                            // wrapped in the projection parens
                            let body: String = inner
                                .as_str()
                                .to_ascii_uppercase()
                                .split_whitespace()
                                .collect();
                            let aggregates = [
                                "COUNT(",
                                "SUM(",
                                "AVG(",
                                "MIN(",
                                "MAX(",
                                "SAMPLE(",
                                "GROUP_CONCAT(",
                            ];
                            if aggregates.iter().any(|kw| body.contains(kw)) {
                                return Err(ParseError::Unsupported(
                                    "aggregate functions".to_string(),
                                ));
                            }
                            return Err(ParseError::Unsupported(
                                "expression projections (SELECT (... AS ?v))".to_string(),
                            ));
                        }
                        rule => return Err(malformed(rule)),
                    }
                }
                rule => return Err(malformed(rule)),
            }
        }
        Ok(Projection::Variables(variables))
    }

    // ----------------------------------------------------------------------
    // Graph patterns

    fn where_clause(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Algebra> {
        self.group(first_inner(pair)?)
    }

    fn group(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Algebra> {
        self.group_parts(pair)?.into_algebra()
    }

    fn group_parts(&mut self, pair: Pair<'_, Rule>) -> ParseResult<GroupParts> {
        let sub = first_inner(pair)?;
        let mut pattern: Option<Algebra> = None;
        let mut filters = Vec::new();

        for item in sub.into_inner() {
            match item.as_rule() {
                Rule::triples_block => {
                    for triple in self.triples_block(item)? {
                        pattern = join(pattern, Algebra::Scan(triple));
                    }
                }
                Rule::graph_pattern_not_triples => {
                    let inner = first_inner(item)?;
                    match inner.as_rule() {
                        Rule::group_or_union => {
                            pattern = join(pattern, self.group_or_union(inner)?);
                        }
                        Rule::optional_pattern => {
                            let left = pattern.take().ok_or_else(|| {
                                ParseError::Semantic(
                                    "OPTIONAL requires a preceding pattern".to_string(),
                                )
                            })?;
                            let parts = self.group_parts(first_inner(inner)?)?;
                            let right = parts.pattern.ok_or_else(|| {
                                ParseError::Semantic("empty OPTIONAL group".to_string())
                            })?;
                            let condition = parts.filters.into_iter().reduce(|l, r| {
                                Expression::Binary {
                                    op: BinaryOp::And,
                                    left: Box::new(l),
                                    right: Box::new(r),
                                }
                            });
                            pattern = Some(Algebra::LeftJoin {
                                left: Box::new(left),
                                right: Box::new(right),
                                condition,
                            });
                        }
                        Rule::filter_pattern => {
                            filters.push(self.constraint(first_inner(inner)?)?);
                        }
                        Rule::sub_select => {
                            return Err(ParseError::Unsupported("subqueries".to_string()))
                        }
                        Rule::minus_pattern => {
                            return Err(ParseError::Unsupported("MINUS".to_string()))
                        }
                        Rule::graph_named_pattern => {
                            return Err(ParseError::Unsupported("GRAPH".to_string()))
                        }
                        Rule::service_pattern => {
                            return Err(ParseError::Unsupported("SERVICE".to_string()))
                        }
                        Rule::bind_pattern => {
                            return Err(ParseError::Unsupported("BIND".to_string()))
                        }
                        Rule::values_pattern => {
                            return Err(ParseError::Unsupported("VALUES".to_string()))
                        }
                        rule => return Err(malformed(rule)),
                    }
                }
                rule => return Err(malformed(rule)),
            }
        }

        Ok(GroupParts { pattern, filters })
    }

    fn group_or_union(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Algebra> {
        let mut branches = pair.into_inner();
        let mut algebra = self.group(take_next(&mut branches, "group")?)?;
        for branch in branches {
            algebra = Algebra::Union(Box::new(algebra), Box::new(self.group(branch)?));
        }
        Ok(algebra)
    }

    // ----------------------------------------------------------------------
    // Triple patterns

    fn triples_block(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Vec<TriplePattern>> {
        let mut triples = Vec::new();
        for same_subject in pair.into_inner() {
            let mut inner = same_subject.into_inner();
            let subject = self.subject(take_next(&mut inner, "triple")?)?;
            let property_list = take_next(&mut inner, "triple")?;

            for verb_objects in property_list.into_inner() {
                let mut vo = verb_objects.into_inner();
                let predicate = self.verb(take_next(&mut vo, "predicate")?)?;
                let object_list = take_next(&mut vo, "objects")?;
                for object in object_list.into_inner() {
                    triples.push(TriplePattern::new(
                        subject.clone(),
                        predicate.clone(),
                        self.object(object)?,
                    ));
                }
            }
        }
        Ok(triples)
    }

    fn subject(&mut self, pair: Pair<'_, Rule>) -> ParseResult<TermPattern> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::var => Ok(TermPattern::Variable(variable_name(inner)?)),
            Rule::blank_node => Ok(blank_node_pattern(inner)?),
            Rule::iri => Ok(TermPattern::Term(self.named_node(inner)?.into())),
            rule => Err(malformed(rule)),
        }
    }

    fn verb(&mut self, pair: Pair<'_, Rule>) -> ParseResult<TermPattern> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::property_path => Err(ParseError::Unsupported("property paths".to_string())),
            Rule::a_keyword => Ok(TermPattern::Term(NamedNode::new(rdf::TYPE).into())),
            Rule::var => Ok(TermPattern::Variable(variable_name(inner)?)),
            Rule::iri => Ok(TermPattern::Term(self.named_node(inner)?.into())),
            rule => Err(malformed(rule)),
        }
    }

    fn object(&mut self, pair: Pair<'_, Rule>) -> ParseResult<TermPattern> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::var => Ok(TermPattern::Variable(variable_name(inner)?)),
            Rule::literal => Ok(TermPattern::Term(self.literal(inner)?)),
            Rule::blank_node => Ok(blank_node_pattern(inner)?),
            Rule::iri => Ok(TermPattern::Term(self.named_node(inner)?.into())),
            rule => Err(malformed(rule)),
        }
    }

    // ----------------------------------------------------------------------
    // Terms

    fn named_node(&self, pair: Pair<'_, Rule>) -> ParseResult<NamedNode> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::iri_ref => Ok(NamedNode::new(strip_iri_ref(inner.as_str()))),
            Rule::pname => self.expand_pname(inner.as_str()).map(NamedNode::new),
            rule => Err(malformed(rule)),
        }
    }

    fn expand_pname(&self, pname: &str) -> ParseResult<String> {
        let (prefix, local) = pname
            .split_once(':')
            .ok_or_else(|| ParseError::Semantic(format!("not a prefixed name: {}", pname)))?;
        if let Some(ns) = self.prefixes.get(prefix) {
            return Ok(format!("{}{}", ns, local));
        }
        if let Ok(ns) = self.namespaces.get(prefix) {
            return Ok(format!("{}{}", ns, local));
        }
        Err(ParseError::UnknownPrefix(prefix.to_string()))
    }

    fn literal(&self, pair: Pair<'_, Rule>) -> ParseResult<Term> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::rdf_literal => self.rdf_literal(inner),
            Rule::numeric_literal => {
                let text = inner.as_str();
                let datatype = if text.contains(['e', 'E']) {
                    xsd::DOUBLE
                } else if text.contains('.') {
                    xsd::DECIMAL
                } else {
                    xsd::INTEGER
                };
                Ok(Literal::new_typed(text, NamedNode::new(datatype)).into())
            }
            Rule::boolean_literal => Ok(Literal::new_typed(
                inner.as_str(),
                NamedNode::new(xsd::BOOLEAN),
            )
            .into()),
            rule => Err(malformed(rule)),
        }
    }

    fn rdf_literal(&self, pair: Pair<'_, Rule>) -> ParseResult<Term> {
        let mut inner = pair.into_inner();
        let value = unescape_string(take_next(&mut inner, "literal")?.as_str())?;

        match inner.next() {
            None => Ok(Literal::new_simple(value).into()),
            Some(tail) => match tail.as_rule() {
                Rule::langtag => {
                    let tag = tail.as_str().trim_start_matches('@');
                    Literal::new_language_tagged(value, tag)
                        .map(Term::from)
                        .map_err(|e| ParseError::Semantic(e.to_string()))
                }
                Rule::iri => {
                    Ok(Literal::new_typed(value, self.named_node(tail)?).into())
                }
                rule => Err(malformed(rule)),
            },
        }
    }

    // ----------------------------------------------------------------------
    // Expressions

    fn constraint(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Expression> {
        match pair.as_rule() {
            Rule::constraint => self.constraint(first_inner(pair)?),
            Rule::bracketted_expression => self.expression(first_inner(pair)?),
            Rule::builtin_call => self.builtin_call(pair),
            rule => Err(malformed(rule)),
        }
    }

    fn expression(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Expression> {
        match pair.as_rule() {
            Rule::expression => self.binary_chain(pair, |_| BinaryOp::Or),
            Rule::conditional_and => self.binary_chain(pair, |_| BinaryOp::And),
            Rule::value_logical => self.binary_chain(pair, |op| match op {
                "=" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "<=" => BinaryOp::Le,
                ">=" => BinaryOp::Ge,
                "<" => BinaryOp::Lt,
                _ => BinaryOp::Gt,
            }),
            Rule::additive_expression => self.binary_chain(pair, |op| match op {
                "+" => BinaryOp::Add,
                _ => BinaryOp::Sub,
            }),
            Rule::multiplicative_expression => self.binary_chain(pair, |op| match op {
                "*" => BinaryOp::Mul,
                _ => BinaryOp::Div,
            }),
            Rule::unary_expression => self.unary_expression(pair),
            rule => Err(malformed(rule)),
        }
    }

    /// Fold a left-associative operand/operator chain
    fn binary_chain(
        &mut self,
        pair: Pair<'_, Rule>,
        op_for: fn(&str) -> BinaryOp,
    ) -> ParseResult<Expression> {
        let mut inner = pair.into_inner();
        let mut expr = self.expression(take_next(&mut inner, "expression")?)?;
        while let Some(op) = inner.next() {
            let rhs = self.expression(take_next(&mut inner, "expression")?)?;
            expr = Expression::Binary {
                op: op_for(op.as_str()),
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn unary_expression(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Expression> {
        let mut inner = pair.into_inner();
        let head = take_next(&mut inner, "expression")?;
        match head.as_rule() {
            Rule::not_op => {
                let operand = self.expression(take_next(&mut inner, "expression")?)?;
                Ok(Expression::Not(Box::new(operand)))
            }
            Rule::neg_op => {
                let operand = self.expression(take_next(&mut inner, "expression")?)?;
                Ok(Expression::Neg(Box::new(operand)))
            }
            Rule::primary_expression => self.primary_expression(head),
            rule => Err(malformed(rule)),
        }
    }

    fn primary_expression(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Expression> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::bracketted_expression => self.expression(first_inner(inner)?),
            Rule::builtin_call => self.builtin_call(inner),
            Rule::literal => Ok(Expression::Term(self.literal(inner)?)),
            Rule::var => Ok(Expression::Variable(variable_name(inner)?)),
            Rule::iri => Ok(Expression::Term(self.named_node(inner)?.into())),
            rule => Err(malformed(rule)),
        }
    }

    fn builtin_call(&mut self, pair: Pair<'_, Rule>) -> ParseResult<Expression> {
        let mut inner = pair.into_inner();
        let name = take_next(&mut inner, "builtin")?.as_str().to_ascii_uppercase();

        let mut args = Vec::new();
        for arg in inner {
            args.push(self.expression(arg)?);
        }

        let (builtin, arity) = match name.as_str() {
            "BOUND" => (Builtin::Bound, 1..=1),
            "STR" => (Builtin::Str, 1..=1),
            "LANG" => (Builtin::Lang, 1..=1),
            "DATATYPE" => (Builtin::Datatype, 1..=1),
            "ISIRI" | "ISURI" => (Builtin::IsIri, 1..=1),
            "ISBLANK" => (Builtin::IsBlank, 1..=1),
            "ISLITERAL" => (Builtin::IsLiteral, 1..=1),
            "REGEX" => (Builtin::Regex, 2..=3),
            other => return Err(ParseError::Unsupported(format!("{}()", other))),
        };

        if !arity.contains(&args.len()) {
            return Err(ParseError::Semantic(format!(
                "{}() takes {}..{} arguments, got {}",
                name,
                arity.start(),
                arity.end(),
                args.len()
            )));
        }
        if builtin == Builtin::Bound && !matches!(args[0], Expression::Variable(_)) {
            return Err(ParseError::Semantic(
                "BOUND() requires a variable argument".to_string(),
            ));
        }

        Ok(Expression::Call { builtin, args })
    }

    // ----------------------------------------------------------------------
    // Solution modifiers

    fn solution_modifier(&mut self, pair: Pair<'_, Rule>) -> ParseResult<SolutionModifier> {
        let mut modifier = SolutionModifier::default();
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::group_clause => {
                    return Err(ParseError::Unsupported("GROUP BY".to_string()))
                }
                Rule::having_clause => return Err(ParseError::Unsupported("HAVING".to_string())),
                Rule::order_clause => {
                    for condition in child.into_inner() {
                        modifier.keys.push(self.order_condition(condition)?);
                    }
                }
                Rule::limit_offset_clauses => {
                    for clause in child.into_inner() {
                        let value = parse_count(first_inner(clause.clone())?.as_str())?;
                        match clause.as_rule() {
                            Rule::limit_clause => modifier.limit = Some(value),
                            Rule::offset_clause => modifier.offset = value,
                            rule => return Err(malformed(rule)),
                        }
                    }
                }
                rule => return Err(malformed(rule)),
            }
        }
        Ok(modifier)
    }

    fn order_condition(&mut self, pair: Pair<'_, Rule>) -> ParseResult<OrderKey> {
        let inner = first_inner(pair)?;
        match inner.as_rule() {
            Rule::ordered_key => {
                let mut parts = inner.into_inner();
                let direction = take_next(&mut parts, "ORDER BY key")?;
                let descending = direction.as_str().eq_ignore_ascii_case("DESC");
                let expr = self.expression(first_inner(take_next(&mut parts, "ORDER BY key")?)?)?;
                Ok(OrderKey { expr, descending })
            }
            Rule::bracketted_expression => Ok(OrderKey {
                expr: self.expression(first_inner(inner)?)?,
                descending: false,
            }),
            Rule::builtin_call => Ok(OrderKey {
                expr: self.builtin_call(inner)?,
                descending: false,
            }),
            Rule::var => Ok(OrderKey {
                expr: Expression::Variable(variable_name(inner)?),
                descending: false,
            }),
            rule => Err(malformed(rule)),
        }
    }
}

enum Projection {
    Star,
    Variables(Vec<String>),
}

#[derive(Default, Clone)]
struct SolutionModifier {
    keys: Vec<OrderKey>,
    limit: Option<usize>,
    offset: usize,
}

impl SolutionModifier {
    fn order(&self, child: Algebra) -> Algebra {
        if self.keys.is_empty() {
            return child;
        }
        Algebra::OrderBy {
            child: Box::new(child),
            keys: self.keys.clone(),
        }
    }

    fn slice(&self, child: Algebra) -> Algebra {
        if self.limit.is_none() && self.offset == 0 {
            return child;
        }
        Algebra::Slice {
            child: Box::new(child),
            offset: self.offset,
            limit: self.limit,
        }
    }
}

// ----------------------------------------------------------------------
// Pair plumbing

fn malformed(rule: Rule) -> ParseError {
    ParseError::Semantic(format!("unexpected {:?} node in parse tree", rule))
}

/// Fold the next pattern of a group into the accumulated algebra: the first
/// pattern stands alone, later ones join left to right.
fn join(pattern: Option<Algebra>, next: Algebra) -> Option<Algebra> {
    Some(match pattern {
        None => next,
        Some(left) => Algebra::Join(Box::new(left), Box::new(next)),
    })
}

fn first_inner(pair: Pair<'_, Rule>) -> ParseResult<Pair<'_, Rule>> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| ParseError::Semantic(format!("empty {:?} node in parse tree", rule)))
}

fn take_next<'i>(
    pairs: &mut pest::iterators::Pairs<'i, Rule>,
    context: &str,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Semantic(format!("incomplete {} in parse tree", context)))
}

fn variable_name(pair: Pair<'_, Rule>) -> ParseResult<String> {
    Ok(first_inner(pair)?.as_str().to_string())
}

fn blank_node_pattern(pair: Pair<'_, Rule>) -> ParseResult<TermPattern> {
    Ok(TermPattern::Variable(bnode_variable(
        first_inner(pair)?.as_str(),
    )))
}

fn strip_iri_ref(raw: &str) -> String {
    raw.trim_start_matches('<').trim_end_matches('>').to_string()
}

fn parse_count(text: &str) -> ParseResult<usize> {
    text.parse()
        .map_err(|_| ParseError::Semantic(format!("count out of range: {}", text)))
}

fn unescape_string(raw: &str) -> ParseResult<String> {
    let body = if raw.starts_with("\"\"\"") {
        &raw[3..raw.len() - 3]
    } else {
        &raw[1..raw.len() - 1]
    };

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{0008}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('u') => out.push(unescape_codepoint(&mut chars, 4)?),
            Some('U') => out.push(unescape_codepoint(&mut chars, 8)?),
            other => {
                return Err(ParseError::Semantic(format!(
                    "invalid string escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

fn unescape_codepoint(chars: &mut std::str::Chars<'_>, digits: usize) -> ParseResult<char> {
    let hex: String = chars.take(digits).collect();
    if hex.len() != digits {
        return Err(ParseError::Semantic("truncated \\u escape".to_string()));
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ParseError::Semantic(format!("invalid codepoint: \\u{}", hex)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParseResult<Query> {
        parse_query(input, &NamespaceManager::new())
    }

    fn node(iri: &str) -> TermPattern {
        TermPattern::Term(NamedNode::new(iri).into())
    }

    fn var(name: &str) -> TermPattern {
        TermPattern::Variable(name.to_string())
    }

    #[test]
    fn test_simple_select() {
        let query = parse("SELECT ?s ?o WHERE { ?s <http://example.org/p> ?o }").unwrap();
        assert_eq!(
            query.form,
            QueryForm::Select {
                variables: vec!["s".to_string(), "o".to_string()]
            }
        );
        assert_eq!(
            query.pattern,
            Algebra::Project {
                child: Box::new(Algebra::Scan(TriplePattern::new(
                    var("s"),
                    node("http://example.org/p"),
                    var("o"),
                ))),
                variables: vec!["s".to_string(), "o".to_string()],
            }
        );
    }

    #[test]
    fn test_prologue_prefix_expansion() {
        let query = parse(
            "PREFIX ex: <http://example.org/>\nSELECT ?s WHERE { ?s ex:knows ex:bob }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        assert_eq!(
            *child,
            Algebra::Scan(TriplePattern::new(
                var("s"),
                node("http://example.org/knows"),
                node("http://example.org/bob"),
            ))
        );
    }

    #[test]
    fn test_store_prefix_fallback_and_override() {
        // foaf: comes from the store table, unprefixed in the query
        assert!(parse("SELECT ?s WHERE { ?s foaf:name ?n }").is_ok());

        // a prologue declaration shadows the store binding
        let query =
            parse("PREFIX foaf: <http://example.org/f#> SELECT ?s WHERE { ?s foaf:name ?n }")
                .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        assert_eq!(
            *child,
            Algebra::Scan(TriplePattern::new(
                var("s"),
                node("http://example.org/f#name"),
                var("n"),
            ))
        );
    }

    #[test]
    fn test_unknown_prefix() {
        let err = parse("SELECT ?s WHERE { ?s nope:p ?o }").unwrap_err();
        assert!(matches!(err, ParseError::UnknownPrefix(p) if p == "nope"));
    }

    #[test]
    fn test_a_keyword_and_predicate_object_lists() {
        let query = parse(
            "PREFIX ex: <http://example.org/>\n\
             SELECT * WHERE { ?s a ex:Person ; ex:name ?n , ?m . }",
        )
        .unwrap();
        let Algebra::Project { child, variables } = query.pattern else {
            panic!("expected projection");
        };
        assert_eq!(variables, vec!["s", "n", "m"]);
        // three scans joined left to right
        let Algebra::Join(left, third) = *child else {
            panic!("expected join");
        };
        assert_eq!(
            *third,
            Algebra::Scan(TriplePattern::new(
                var("s"),
                node("http://example.org/name"),
                var("m"),
            ))
        );
        let Algebra::Join(first, _) = *left else {
            panic!("expected join");
        };
        assert_eq!(
            *first,
            Algebra::Scan(TriplePattern::new(
                var("s"),
                node(rdf::TYPE),
                node("http://example.org/Person"),
            ))
        );
    }

    #[test]
    fn test_literals() {
        let query = parse(
            "PREFIX ex: <http://example.org/>\n\
             SELECT ?s WHERE {\n\
               ?s ex:name \"Alice\" .\n\
               ?s ex:greeting \"hi\"@en .\n\
               ?s ex:age 30 .\n\
               ?s ex:score 1.5 .\n\
               ?s ex:ratio 2e3 .\n\
               ?s ex:active true .\n\
             }",
        )
        .unwrap();

        let mut objects = Vec::new();
        fn collect(node: &Algebra, out: &mut Vec<TermPattern>) {
            match node {
                Algebra::Scan(p) => out.push(p.object.clone()),
                Algebra::Join(l, r) => {
                    collect(l, out);
                    collect(r, out);
                }
                Algebra::Project { child, .. } => collect(child, out),
                _ => panic!("unexpected algebra node"),
            }
        }
        collect(&query.pattern, &mut objects);

        assert_eq!(objects[0], TermPattern::Term(Literal::new_simple("Alice").into()));
        assert_eq!(
            objects[1],
            TermPattern::Term(Literal::new_language_tagged("hi", "en").unwrap().into())
        );
        assert_eq!(
            objects[2],
            TermPattern::Term(Literal::new_typed("30", NamedNode::new(xsd::INTEGER)).into())
        );
        assert_eq!(
            objects[3],
            TermPattern::Term(Literal::new_typed("1.5", NamedNode::new(xsd::DECIMAL)).into())
        );
        assert_eq!(
            objects[4],
            TermPattern::Term(Literal::new_typed("2e3", NamedNode::new(xsd::DOUBLE)).into())
        );
        assert_eq!(
            objects[5],
            TermPattern::Term(Literal::new_typed("true", NamedNode::new(xsd::BOOLEAN)).into())
        );
    }

    #[test]
    fn test_string_escapes() {
        let query = parse(
            "PREFIX ex: <http://example.org/> SELECT ?s WHERE { ?s ex:p \"line\\nbreak \\\"q\\\"\" }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        let Algebra::Scan(pattern) = *child else {
            panic!("expected scan");
        };
        assert_eq!(
            pattern.object,
            TermPattern::Term(Literal::new_simple("line\nbreak \"q\"").into())
        );
    }

    #[test]
    fn test_filter_precedence() {
        // || binds looser than &&, comparison looser than arithmetic
        let query = parse(
            "SELECT ?x WHERE { ?x <http://example.org/v> ?v . FILTER(?v > 1 + 2 && ?v < 9 || BOUND(?x)) }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        let Algebra::Filter { condition, .. } = *child else {
            panic!("expected filter");
        };
        let Expression::Binary { op: BinaryOp::Or, left, .. } = condition else {
            panic!("expected || at the top");
        };
        let Expression::Binary { op: BinaryOp::And, left: cmp, .. } = *left else {
            panic!("expected && under ||");
        };
        let Expression::Binary { op: BinaryOp::Gt, right: sum, .. } = *cmp else {
            panic!("expected > under &&");
        };
        assert!(matches!(
            *sum,
            Expression::Binary { op: BinaryOp::Add, .. }
        ));
    }

    #[test]
    fn test_filter_applies_at_group_end() {
        // FILTER written between triples still applies to the whole group
        let query = parse(
            "SELECT ?x WHERE { ?x <http://example.org/a> ?a . FILTER(BOUND(?b)) ?x <http://example.org/b> ?b }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        let Algebra::Filter { child: joined, .. } = *child else {
            panic!("expected filter on top of the whole group");
        };
        assert!(matches!(*joined, Algebra::Join(_, _)));
    }

    #[test]
    fn test_optional_hoists_inner_filter() {
        let query = parse(
            "SELECT ?s ?email WHERE {\n\
               ?s <http://example.org/name> ?n .\n\
               OPTIONAL { ?s <http://example.org/email> ?email . FILTER(ISLITERAL(?email)) }\n\
             }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        let Algebra::LeftJoin { right, condition, .. } = *child else {
            panic!("expected left join");
        };
        assert!(matches!(*right, Algebra::Scan(_)));
        assert!(matches!(
            condition,
            Some(Expression::Call { builtin: Builtin::IsLiteral, .. })
        ));
    }

    #[test]
    fn test_leading_optional_rejected() {
        let err = parse("SELECT ?x WHERE { OPTIONAL { ?x ?p ?o } }").unwrap_err();
        assert!(matches!(err, ParseError::Semantic(_)));
    }

    #[test]
    fn test_union() {
        let query = parse(
            "SELECT ?n WHERE { { ?s <http://example.org/a> ?n } UNION { ?s <http://example.org/b> ?n } UNION { ?s <http://example.org/c> ?n } }",
        )
        .unwrap();
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        // left-associative: (a UNION b) UNION c
        let Algebra::Union(left, _) = *child else {
            panic!("expected union");
        };
        assert!(matches!(*left, Algebra::Union(_, _)));
    }

    #[test]
    fn test_order_limit_offset() {
        let query = parse(
            "SELECT ?s ?age WHERE { ?s <http://example.org/age> ?age } ORDER BY DESC(?age) ?s LIMIT 10 OFFSET 5",
        )
        .unwrap();
        let Algebra::Slice { child, offset, limit } = query.pattern else {
            panic!("expected slice outermost");
        };
        assert_eq!((offset, limit), (5, Some(10)));
        let Algebra::Project { child, .. } = *child else {
            panic!("expected projection under slice");
        };
        let Algebra::OrderBy { keys, .. } = *child else {
            panic!("expected order under projection");
        };
        assert_eq!(keys.len(), 2);
        assert!(keys[0].descending);
        assert!(!keys[1].descending);
    }

    #[test]
    fn test_offset_before_limit() {
        let query =
            parse("SELECT ?s WHERE { ?s ?p ?o } OFFSET 2 LIMIT 3").unwrap();
        let Algebra::Slice { offset, limit, .. } = query.pattern else {
            panic!("expected slice");
        };
        assert_eq!((offset, limit), (2, Some(3)));
    }

    #[test]
    fn test_ask() {
        let query = parse("ASK { <http://example.org/a> ?p ?o }").unwrap();
        assert_eq!(query.form, QueryForm::Ask);
    }

    #[test]
    fn test_construct() {
        let query = parse(
            "PREFIX ex: <http://example.org/>\n\
             CONSTRUCT { ?s ex:label ?n } WHERE { ?s ex:name ?n }",
        )
        .unwrap();
        let QueryForm::Construct { template } = query.form else {
            panic!("expected construct");
        };
        assert_eq!(template.len(), 1);
        assert_eq!(template[0].predicate, node("http://example.org/label"));
    }

    #[test]
    fn test_blank_node_is_nondistinguished_variable() {
        let query = parse("SELECT * WHERE { _:x <http://example.org/p> ?o }").unwrap();
        // the blank node variable joins like a variable but is not projected
        let QueryForm::Select { variables } = &query.form else {
            panic!("expected select");
        };
        assert_eq!(variables, &vec!["o".to_string()]);
        let Algebra::Project { child, .. } = query.pattern else {
            panic!("expected projection");
        };
        let Algebra::Scan(pattern) = *child else {
            panic!("expected scan");
        };
        assert!(matches!(
            &pattern.subject,
            TermPattern::Variable(name) if is_bnode_variable(name)
        ));
    }

    #[test]
    fn test_duplicate_projection_rejected() {
        let err = parse("SELECT ?s ?s WHERE { ?s ?p ?o }").unwrap_err();
        assert!(matches!(err, ParseError::Semantic(_)));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse("SELECT ?s WHERE { ?s ?p ?o ").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn test_unsupported_features_are_named() {
        let cases = [
            ("SELECT ?s WHERE { ?s <http://e.org/p>* ?o }", "property paths"),
            ("SELECT ?s WHERE { ?s <http://e.org/p>/<http://e.org/q> ?o }", "property paths"),
            ("SELECT DISTINCT ?s WHERE { ?s ?p ?o }", "SELECT DISTINCT"),
            ("SELECT (COUNT(?s) AS ?n) WHERE { ?s ?p ?o }", "aggregate"),
            ("SELECT (SUM((?a * ?b)) AS ?n) WHERE { ?s ?a ?b }", "aggregate"),
            ("SELECT ((?a + ?b) AS ?x) WHERE { ?s ?a ?b }", "expression projections"),
            ("SELECT ?s WHERE { ?s ?p ?o } GROUP BY ?s", "GROUP BY"),
            ("SELECT ?s WHERE { ?s ?p ?o . BIND(?o AS ?x) }", "BIND"),
            ("SELECT ?s WHERE { ?s ?p ?o . VALUES ?s { <http://e.org/a> } }", "VALUES"),
            ("SELECT ?s WHERE { ?s ?p ?o . MINUS { ?s ?p <http://e.org/x> } }", "MINUS"),
            ("SELECT ?s WHERE { GRAPH ?g { ?s ?p ?o } }", "GRAPH"),
            ("SELECT ?s WHERE { SERVICE <http://e.org/sparql> { ?s ?p ?o } }", "SERVICE"),
            ("SELECT ?s WHERE { { SELECT ?s WHERE { ?s ?p ?o } } }", "subqueries"),
            ("DESCRIBE <http://e.org/a>", "DESCRIBE"),
            ("BASE <http://e.org/> SELECT ?s WHERE { ?s ?p ?o }", "BASE"),
        ];
        for (input, needle) in cases {
            match parse(input) {
                Err(ParseError::Unsupported(msg)) => {
                    assert!(msg.contains(needle), "{:?} missing {:?}", msg, needle)
                }
                other => panic!("{} should be unsupported, got {:?}", input, other.map(|q| q.form)),
            }
        }
    }

    #[test]
    fn test_builtin_arity_checked() {
        let err = parse("SELECT ?s WHERE { ?s ?p ?o . FILTER(REGEX(?o)) }").unwrap_err();
        assert!(matches!(err, ParseError::Semantic(_)));
        let err = parse("SELECT ?s WHERE { ?s ?p ?o . FILTER(BOUND(STR(?o))) }").unwrap_err();
        assert!(matches!(err, ParseError::Semantic(_)));
    }

    #[test]
    fn test_empty_group_rejected() {
        let err = parse("ASK { }").unwrap_err();
        assert!(matches!(err, ParseError::Semantic(_)));
    }
}
