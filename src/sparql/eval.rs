//! Query evaluation
//!
//! Pull-based: each algebra node lowers to an iterator of solutions drawn
//! from its children, so LIMIT stops work early and only ORDER BY
//! materializes the full solution sequence. Evaluation carries the partial
//! solution downward: a join re-evaluates its right side once per left row,
//! and scans substitute the variables bound so far into the pattern before
//! hitting the store indexes. Expression errors (unbound variables, type
//! mismatches) are not surfaced to the caller; per SPARQL semantics they
//! make the affected FILTER condition false and the solution is silently
//! discarded.

use std::cmp::Ordering;

use regex::RegexBuilder;
use rustc_hash::FxHashSet;

use crate::rdf::vocab::{rdf, xsd};
use crate::rdf::{Literal, NamedNode, Subject, Term, Triple, TripleStore};

use super::algebra::{
    Algebra, BinaryOp, Builtin, Expression, OrderKey, Query, QueryForm, TermPattern, TriplePattern,
};
use super::results::{QuerySolution, SparqlResults};

type SolutionIter<'a> = Box<dyn Iterator<Item = QuerySolution> + 'a>;

/// Evaluate a parsed query against a store snapshot
pub(super) fn evaluate_query(store: &TripleStore, query: &Query) -> SparqlResults {
    match &query.form {
        QueryForm::Select { variables } => SparqlResults::Bindings {
            variables: variables.clone(),
            solutions: evaluate(store, &query.pattern, QuerySolution::new()).collect(),
        },
        QueryForm::Ask => {
            // stop at the first solution
            SparqlResults::Boolean(
                evaluate(store, &query.pattern, QuerySolution::new())
                    .next()
                    .is_some(),
            )
        }
        QueryForm::Construct { template } => {
            SparqlResults::Graph(construct(store, template, &query.pattern))
        }
    }
}

/// Evaluate a subtree, extending the partial solution accumulated so far.
fn evaluate<'a>(store: &'a TripleStore, node: &'a Algebra, input: QuerySolution) -> SolutionIter<'a> {
    match node {
        Algebra::Scan(pattern) => scan(store, pattern, input),
        Algebra::Join(left, right) => {
            let right = right.as_ref();
            Box::new(
                evaluate(store, left, input).flat_map(move |ls| evaluate(store, right, ls)),
            )
        }
        Algebra::LeftJoin {
            left,
            right,
            condition,
        } => {
            let right = right.as_ref();
            let condition = condition.as_ref();
            Box::new(evaluate(store, left, input).flat_map(move |ls| {
                // the condition gates extensions only; an unmatched or
                // all-rejected right side still keeps the left row
                let extensions: Vec<QuerySolution> = evaluate(store, right, ls.clone())
                    .filter(|extended| {
                        condition.map_or(true, |c| matches!(boolean(c, extended), Ok(true)))
                    })
                    .collect();
                if extensions.is_empty() {
                    vec![ls]
                } else {
                    extensions
                }
                .into_iter()
            }))
        }
        Algebra::Union(left, right) => {
            let second = evaluate(store, right, input.clone());
            Box::new(evaluate(store, left, input).chain(second))
        }
        Algebra::Filter { child, condition } => Box::new(
            evaluate(store, child, input)
                .filter(move |s| matches!(boolean(condition, s), Ok(true))),
        ),
        Algebra::Project { child, variables } => {
            Box::new(evaluate(store, child, input).map(move |s| s.restrict(variables)))
        }
        Algebra::Slice {
            child,
            offset,
            limit,
        } => {
            let rest = evaluate(store, child, input).skip(*offset);
            match limit {
                Some(n) => Box::new(rest.take(*n)),
                None => Box::new(rest),
            }
        }
        Algebra::OrderBy { child, keys } => {
            let mut rows: Vec<QuerySolution> = evaluate(store, child, input).collect();
            // stable, so input order breaks ties
            rows.sort_by(|a, b| compare_rows(keys, a, b));
            Box::new(rows.into_iter())
        }
    }
}

/// Stream store matches for one pattern, with already-bound variables
/// substituted into the index lookup.
fn scan<'a>(
    store: &'a TripleStore,
    pattern: &'a TriplePattern,
    input: QuerySolution,
) -> SolutionIter<'a> {
    let subject: Option<Subject> = match term_for(&pattern.subject, &input) {
        // a literal can never be a subject, so such a pattern matches nothing
        Some(term) => match term.as_subject() {
            Some(s) => Some(s),
            None => return Box::new(std::iter::empty()),
        },
        None => None,
    };
    let predicate: Option<NamedNode> = match term_for(&pattern.predicate, &input) {
        Some(Term::NamedNode(n)) => Some(n.clone()),
        Some(_) => return Box::new(std::iter::empty()),
        None => None,
    };
    let object: Option<Term> = term_for(&pattern.object, &input).cloned();

    Box::new(
        store
            .matching(subject, predicate, object)
            .filter_map(move |t| unify(pattern, t, &input)),
    )
}

/// Bind the pattern's variables against a matched triple, extending the
/// input solution. Fails when a repeated variable would take two different
/// values.
fn unify(pattern: &TriplePattern, triple: &Triple, input: &QuerySolution) -> Option<QuerySolution> {
    let mut solution = input.clone();
    bind(&mut solution, &pattern.subject, &triple.subject.clone().into())?;
    bind(
        &mut solution,
        &pattern.predicate,
        &Term::NamedNode(triple.predicate.clone()),
    )?;
    bind(&mut solution, &pattern.object, &triple.object)?;
    Some(solution)
}

fn bind(solution: &mut QuerySolution, pattern: &TermPattern, term: &Term) -> Option<()> {
    match pattern {
        TermPattern::Term(expected) => (expected == term).then_some(()),
        TermPattern::Variable(name) => match solution.get(name) {
            Some(existing) if existing != term => None,
            Some(_) => Some(()),
            None => {
                solution.bind(name.clone(), term.clone());
                Some(())
            }
        },
    }
}

fn construct(store: &TripleStore, template: &[TriplePattern], pattern: &Algebra) -> Vec<Triple> {
    let mut seen: FxHashSet<Triple> = FxHashSet::default();
    let mut triples = Vec::new();
    for solution in evaluate(store, pattern, QuerySolution::new()) {
        for tp in template {
            // template triples with unbound variables or ill-placed terms
            // are skipped, not errors
            if let Some(triple) = instantiate(tp, &solution) {
                if seen.insert(triple.clone()) {
                    triples.push(triple);
                }
            }
        }
    }
    triples
}

fn instantiate(template: &TriplePattern, solution: &QuerySolution) -> Option<Triple> {
    let subject = term_for(&template.subject, solution)?.as_subject()?;
    let predicate = match term_for(&template.predicate, solution)? {
        Term::NamedNode(n) => n.clone(),
        _ => return None,
    };
    let object = term_for(&template.object, solution)?.clone();
    Some(Triple::new(subject, predicate, object))
}

fn term_for<'s>(pattern: &'s TermPattern, solution: &'s QuerySolution) -> Option<&'s Term> {
    match pattern {
        TermPattern::Term(term) => Some(term),
        TermPattern::Variable(name) => solution.get(name),
    }
}

// ---------------------------------------------------------------------------
// Expression evaluation

/// Expression evaluation failure. Never escapes the engine: a failing FILTER
/// condition counts as false, a failing ORDER BY key sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprError {
    Unbound,
    Type,
}

type ExprResult<T> = Result<T, ExprError>;

/// Evaluate an expression to its effective boolean value.
///
/// `&&` and `||` follow the SPARQL three-valued tables: an error on one side
/// can still be absorbed by `false && ...` or `true || ...`.
fn boolean(expr: &Expression, solution: &QuerySolution) -> ExprResult<bool> {
    match expr {
        Expression::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => match boolean(left, solution) {
            Ok(true) => Ok(true),
            l => match (l, boolean(right, solution)) {
                (_, Ok(true)) => Ok(true),
                (Ok(false), Ok(false)) => Ok(false),
                _ => Err(ExprError::Type),
            },
        },
        Expression::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => match boolean(left, solution) {
            Ok(false) => Ok(false),
            l => match (l, boolean(right, solution)) {
                (_, Ok(false)) => Ok(false),
                (Ok(true), Ok(true)) => Ok(true),
                _ => Err(ExprError::Type),
            },
        },
        Expression::Not(inner) => boolean(inner, solution).map(|b| !b),
        _ => effective_boolean_value(&value(expr, solution)?),
    }
}

/// Evaluate an expression to a term
fn value(expr: &Expression, solution: &QuerySolution) -> ExprResult<Term> {
    match expr {
        Expression::Variable(name) => solution.get(name).cloned().ok_or(ExprError::Unbound),
        Expression::Term(term) => Ok(term.clone()),
        Expression::Not(_) => boolean(expr, solution).map(bool_term),
        Expression::Neg(inner) => negate(&value(inner, solution)?),
        Expression::Binary { op, left, right } => match op {
            BinaryOp::Or | BinaryOp::And => boolean(expr, solution).map(bool_term),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge => {
                let l = value(left, solution)?;
                let r = value(right, solution)?;
                compare(*op, &l, &r).map(bool_term)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let l = value(left, solution)?;
                let r = value(right, solution)?;
                arithmetic(*op, &l, &r)
            }
        },
        Expression::Call { builtin, args } => builtin_value(*builtin, args, solution),
    }
}

fn effective_boolean_value(term: &Term) -> ExprResult<bool> {
    let Term::Literal(lit) = term else {
        return Err(ExprError::Type);
    };
    if let Some(b) = lit.boolean_value() {
        return Ok(b);
    }
    if let Some(n) = lit.numeric_value() {
        return Ok(n != 0.0 && !n.is_nan());
    }
    match lit.effective_datatype() {
        Some(xsd::STRING) | None => Ok(!lit.value().is_empty()),
        _ => Err(ExprError::Type),
    }
}

fn compare(op: BinaryOp, l: &Term, r: &Term) -> ExprResult<bool> {
    match op {
        BinaryOp::Eq => terms_equal(l, r),
        BinaryOp::Ne => terms_equal(l, r).map(|b| !b),
        _ => {
            let ordering = term_order(l, r)?;
            Ok(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Term equality for `=`/`!=`: identity, widened to value equality for
/// numeric literals (`1 = 1.0`) and for string literals, where a simple
/// literal denotes the same value as its `xsd:string`-typed form
fn terms_equal(l: &Term, r: &Term) -> ExprResult<bool> {
    if l == r {
        return Ok(true);
    }
    if let (Term::Literal(a), Term::Literal(b)) = (l, r) {
        if let (Some(x), Some(y)) = (a.numeric_value(), b.numeric_value()) {
            return Ok(x == y);
        }
        if a.effective_datatype() == Some(xsd::STRING)
            && b.effective_datatype() == Some(xsd::STRING)
        {
            return Ok(a.value() == b.value());
        }
    }
    Ok(false)
}

/// Ordering for `<`/`<=`/`>`/`>=`: numeric, boolean, or string literals
/// only; everything else is a type error
fn term_order(l: &Term, r: &Term) -> ExprResult<Ordering> {
    let (Term::Literal(a), Term::Literal(b)) = (l, r) else {
        return Err(ExprError::Type);
    };
    if let (Some(x), Some(y)) = (a.numeric_value(), b.numeric_value()) {
        return x.partial_cmp(&y).ok_or(ExprError::Type);
    }
    if let (Some(x), Some(y)) = (a.boolean_value(), b.boolean_value()) {
        return Ok(x.cmp(&y));
    }
    if a.effective_datatype() == Some(xsd::STRING) && b.effective_datatype() == Some(xsd::STRING) {
        return Ok(a.value().cmp(b.value()));
    }
    Err(ExprError::Type)
}

fn arithmetic(op: BinaryOp, l: &Term, r: &Term) -> ExprResult<Term> {
    let (Term::Literal(a), Term::Literal(b)) = (l, r) else {
        return Err(ExprError::Type);
    };
    let x = a.numeric_value().ok_or(ExprError::Type)?;
    let y = b.numeric_value().ok_or(ExprError::Type)?;

    // integer op integer stays integer (division always goes through f64)
    if op != BinaryOp::Div
        && a.effective_datatype() == Some(xsd::INTEGER)
        && b.effective_datatype() == Some(xsd::INTEGER)
    {
        if let (Ok(i), Ok(j)) = (
            a.value().trim().parse::<i64>(),
            b.value().trim().parse::<i64>(),
        ) {
            let result = match op {
                BinaryOp::Add => i.checked_add(j),
                BinaryOp::Sub => i.checked_sub(j),
                _ => i.checked_mul(j),
            };
            if let Some(result) = result {
                return Ok(integer_term(result));
            }
        }
    }

    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        _ => {
            if y == 0.0 {
                return Err(ExprError::Type);
            }
            x / y
        }
    };
    Ok(double_term(result))
}

fn negate(term: &Term) -> ExprResult<Term> {
    let Term::Literal(lit) = term else {
        return Err(ExprError::Type);
    };
    if lit.effective_datatype() == Some(xsd::INTEGER) {
        if let Ok(i) = lit.value().trim().parse::<i64>() {
            if let Some(negated) = i.checked_neg() {
                return Ok(integer_term(negated));
            }
        }
    }
    let n = lit.numeric_value().ok_or(ExprError::Type)?;
    Ok(double_term(-n))
}

fn builtin_value(
    builtin: Builtin,
    args: &[Expression],
    solution: &QuerySolution,
) -> ExprResult<Term> {
    let arg = args.first().ok_or(ExprError::Type)?;
    match builtin {
        Builtin::Bound => {
            let Expression::Variable(name) = arg else {
                return Err(ExprError::Type);
            };
            Ok(bool_term(solution.contains(name)))
        }
        Builtin::Str => match value(arg, solution)? {
            Term::NamedNode(n) => Ok(Literal::new_simple(n.into_string()).into()),
            Term::Literal(lit) => Ok(Literal::new_simple(lit.value()).into()),
            Term::BlankNode(_) => Err(ExprError::Type),
        },
        Builtin::Lang => match value(arg, solution)? {
            Term::Literal(lit) => Ok(Literal::new_simple(lit.language().unwrap_or("")).into()),
            _ => Err(ExprError::Type),
        },
        Builtin::Datatype => match value(arg, solution)? {
            Term::Literal(lit) => {
                if lit.language().is_some() {
                    Ok(NamedNode::new(rdf::LANG_STRING).into())
                } else {
                    Ok(NamedNode::new(lit.effective_datatype().ok_or(ExprError::Type)?).into())
                }
            }
            _ => Err(ExprError::Type),
        },
        Builtin::IsIri => Ok(bool_term(value(arg, solution)?.is_named_node())),
        Builtin::IsBlank => Ok(bool_term(value(arg, solution)?.is_blank_node())),
        Builtin::IsLiteral => Ok(bool_term(value(arg, solution)?.is_literal())),
        Builtin::Regex => regex_match(args, solution),
    }
}

fn regex_match(args: &[Expression], solution: &QuerySolution) -> ExprResult<Term> {
    let text = string_value(args.first().ok_or(ExprError::Type)?, solution)?;
    let pattern = string_value(args.get(1).ok_or(ExprError::Type)?, solution)?;

    let mut builder = RegexBuilder::new(&pattern);
    if let Some(flags_arg) = args.get(2) {
        for flag in string_value(flags_arg, solution)?.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                's' => builder.dot_matches_new_line(true),
                'm' => builder.multi_line(true),
                'x' => builder.ignore_whitespace(true),
                _ => return Err(ExprError::Type),
            };
        }
    }
    let re = builder.build().map_err(|_| ExprError::Type)?;
    Ok(bool_term(re.is_match(&text)))
}

/// The string value of a plain, `xsd:string` or language-tagged literal
fn string_value(expr: &Expression, solution: &QuerySolution) -> ExprResult<String> {
    match value(expr, solution)? {
        Term::Literal(lit)
            if lit.language().is_some() || lit.effective_datatype() == Some(xsd::STRING) =>
        {
            Ok(lit.value().to_string())
        }
        _ => Err(ExprError::Type),
    }
}

fn bool_term(value: bool) -> Term {
    Literal::new_typed(
        if value { "true" } else { "false" },
        NamedNode::new(xsd::BOOLEAN),
    )
    .into()
}

fn integer_term(value: i64) -> Term {
    Literal::new_typed(value.to_string(), NamedNode::new(xsd::INTEGER)).into()
}

fn double_term(value: f64) -> Term {
    Literal::new_typed(value.to_string(), NamedNode::new(xsd::DOUBLE)).into()
}

// ---------------------------------------------------------------------------
// ORDER BY

fn compare_rows(keys: &[OrderKey], a: &QuerySolution, b: &QuerySolution) -> Ordering {
    for key in keys {
        let left = value(&key.expr, a).ok();
        let right = value(&key.expr, b).ok();
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            // unbound and erroring keys sort first
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => order_terms_total(&x, &y),
        };
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Total order over terms: numeric comparison for numeric literal pairs,
/// otherwise the structural term order (blank nodes, IRIs, literals)
fn order_terms_total(a: &Term, b: &Term) -> Ordering {
    if let (Term::Literal(x), Term::Literal(y)) = (a, b) {
        if let (Some(m), Some(n)) = (x.numeric_value(), y.numeric_value()) {
            if let Some(ordering) = m.partial_cmp(&n) {
                return ordering;
            }
        }
    }
    a.cmp(b)
}
