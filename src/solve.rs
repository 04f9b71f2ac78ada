//! Numerical Solver Interface
//!
//! The FHD planner states its optimization as boolean clauses whose atoms
//! may also be linear constraints over real variables, plus one real
//! objective to minimize. This module isolates that contract behind the
//! [`Solver`] trait (`declare`, `assert`, `minimize`, `check`, `model`) so
//! the planner's logic never depends on a particular backend.
//!
//! [`BranchBoundSolver`] is the built-in backend: depth-first search over
//! the boolean variables with unit propagation, and a two-phase simplex
//! solve of the linear system active at each complete boolean assignment.
//! The search is exhaustive, so the reported objective is the global
//! minimum. A wall-clock budget bounds the whole call; exceeding it yields
//! `Unknown`, which callers surface as a deadline error.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// A boolean solver variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(usize);

/// A real-valued solver variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealVar(usize);

/// A possibly-negated boolean variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lit {
    pub var: BoolVar,
    pub negated: bool,
}

impl Lit {
    pub fn pos(var: BoolVar) -> Self {
        Lit {
            var,
            negated: false,
        }
    }

    pub fn neg(var: BoolVar) -> Self {
        Lit { var, negated: true }
    }
}

/// A linear combination of real variables.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    pub terms: Vec<(f64, RealVar)>,
}

impl LinExpr {
    pub fn new() -> Self {
        LinExpr { terms: Vec::new() }
    }

    pub fn term(mut self, coeff: f64, var: RealVar) -> Self {
        self.terms.push((coeff, var));
        self
    }

    /// Unit-coefficient sum of the given variables.
    pub fn sum(vars: impl IntoIterator<Item = RealVar>) -> Self {
        LinExpr {
            terms: vars.into_iter().map(|v| (1.0, v)).collect(),
        }
    }
}

/// Direction of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinCmp {
    Ge,
    Le,
}

/// `expr cmp bound`
#[derive(Debug, Clone)]
pub struct LinConstraint {
    pub expr: LinExpr,
    pub cmp: LinCmp,
    pub bound: f64,
}

/// One atom of an asserted clause.
#[derive(Debug, Clone)]
pub enum ClauseAtom {
    Bool(Lit),
    Linear(LinConstraint),
}

impl ClauseAtom {
    pub fn ge(expr: LinExpr, bound: f64) -> Self {
        ClauseAtom::Linear(LinConstraint {
            expr,
            cmp: LinCmp::Ge,
            bound,
        })
    }

    pub fn le(expr: LinExpr, bound: f64) -> Self {
        ClauseAtom::Linear(LinConstraint {
            expr,
            cmp: LinCmp::Le,
            bound,
        })
    }
}

/// Result of [`Solver::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Satisfied,
    Unsatisfiable,
    Unknown,
}

/// The solver contract the planner is written against.
pub trait Solver {
    fn declare_bool(&mut self, name: &str) -> BoolVar;
    fn declare_real(&mut self, name: &str) -> RealVar;
    /// Assert the disjunction of the given atoms.
    fn assert_clause(&mut self, clause: Vec<ClauseAtom>);
    fn minimize(&mut self, objective: RealVar);
    fn check(&mut self) -> SolveStatus;
    fn bool_value(&self, var: BoolVar) -> bool;
    fn real_value(&self, var: RealVar) -> f64;
}

const EPS: f64 = 1e-7;

/// Built-in exhaustive branch-and-bound backend.
pub struct BranchBoundSolver {
    bool_names: Vec<String>,
    real_names: Vec<String>,
    clauses: Vec<Vec<ClauseAtom>>,
    objective: Option<RealVar>,
    budget: Duration,
    model_bools: Vec<bool>,
    model_reals: Vec<f64>,
}

impl BranchBoundSolver {
    pub fn new() -> Self {
        Self::with_budget(Duration::from_secs(30))
    }

    pub fn with_budget(budget: Duration) -> Self {
        BranchBoundSolver {
            bool_names: Vec::new(),
            real_names: Vec::new(),
            clauses: Vec::new(),
            objective: None,
            budget,
            model_bools: Vec::new(),
            model_reals: Vec::new(),
        }
    }

    /// Derive per-variable bounds from unconditional single-term clauses,
    /// so the LP can use shifted nonnegative columns instead of sign splits.
    fn presolve_bounds(&self) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<bool>) {
        let n = self.real_names.len();
        let mut lower: Vec<Option<f64>> = vec![None; n];
        let mut upper: Vec<Option<f64>> = vec![None; n];
        let mut consumed = vec![false; self.clauses.len()];

        for (ci, clause) in self.clauses.iter().enumerate() {
            if clause.len() != 1 {
                continue;
            }
            let ClauseAtom::Linear(constraint) = &clause[0] else {
                continue;
            };
            if constraint.expr.terms.len() != 1 {
                continue;
            }
            let (coeff, var) = constraint.expr.terms[0];
            if coeff.abs() < EPS {
                continue;
            }
            let value = constraint.bound / coeff;
            let is_lower = match constraint.cmp {
                LinCmp::Ge => coeff > 0.0,
                LinCmp::Le => coeff < 0.0,
            };
            if is_lower {
                let slot = &mut lower[var.0];
                *slot = Some(slot.map_or(value, |prev: f64| prev.max(value)));
            } else {
                let slot = &mut upper[var.0];
                *slot = Some(slot.map_or(value, |prev: f64| prev.min(value)));
            }
            consumed[ci] = true;
        }

        (lower, upper, consumed)
    }

    fn search(&self, state: &mut SearchState<'_>) {
        if state.timed_out || state.start.elapsed() > self.budget {
            state.timed_out = true;
            return;
        }

        let mut trail = Vec::new();
        loop {
            match self.propagate_once(state.assignment.as_slice()) {
                Propagation::Conflict => {
                    for var in trail {
                        state.assignment[var] = None;
                    }
                    return;
                }
                Propagation::Forced(var, value) => {
                    state.assignment[var] = Some(value);
                    trail.push(var);
                }
                Propagation::Stable => break,
            }
        }

        if let Some(branch) = state.assignment.iter().position(Option::is_none) {
            for value in [false, true] {
                state.assignment[branch] = Some(value);
                self.search(state);
                state.assignment[branch] = None;
                if state.timed_out {
                    break;
                }
            }
        } else {
            self.evaluate_leaf(state);
        }

        for var in trail {
            state.assignment[var] = None;
        }
    }

    fn propagate_once(&self, assignment: &[Option<bool>]) -> Propagation {
        for clause in &self.clauses {
            let mut satisfied = false;
            let mut has_linear = false;
            let mut unassigned: Option<(usize, bool)> = None;
            let mut unassigned_count = 0;

            for atom in clause {
                match atom {
                    ClauseAtom::Bool(lit) => match assignment[lit.var.0] {
                        Some(value) => {
                            if value != lit.negated {
                                satisfied = true;
                                break;
                            }
                        }
                        None => {
                            unassigned_count += 1;
                            unassigned = Some((lit.var.0, !lit.negated));
                        }
                    },
                    ClauseAtom::Linear(_) => has_linear = true,
                }
            }

            if satisfied || has_linear {
                continue;
            }
            match unassigned_count {
                0 => return Propagation::Conflict,
                1 => {
                    let (var, value) = unassigned.expect("counted one unassigned literal");
                    return Propagation::Forced(var, value);
                }
                _ => {}
            }
        }
        Propagation::Stable
    }

    /// All booleans assigned: gather the linear constraints that are now
    /// mandatory and minimize the objective over them.
    fn evaluate_leaf(&self, state: &mut SearchState<'_>) {
        let mut active: Vec<&LinConstraint> = Vec::new();

        for (ci, clause) in self.clauses.iter().enumerate() {
            if state.bound_consumed[ci] {
                continue;
            }
            let mut satisfied = false;
            let mut linear: Vec<&LinConstraint> = Vec::new();
            for atom in clause {
                match atom {
                    ClauseAtom::Bool(lit) => {
                        let value = state.assignment[lit.var.0].expect("leaf is complete");
                        if value != lit.negated {
                            satisfied = true;
                            break;
                        }
                    }
                    ClauseAtom::Linear(constraint) => linear.push(constraint),
                }
            }
            if satisfied {
                continue;
            }
            match linear.len() {
                0 => return, // falsified boolean clause; propagation missed nothing to do here
                1 => active.push(linear[0]),
                _ => {
                    // a disjunction of linear atoms has no LP encoding here
                    state.unsupported = true;
                    return;
                }
            }
        }

        let outcome = self.solve_lp(&active, state.lower, state.upper);
        match outcome {
            LpOutcome::Infeasible => {}
            LpOutcome::Optimal { value, point } => {
                let improved = state
                    .best
                    .as_ref()
                    .map_or(true, |(best_value, _, _)| value < *best_value - EPS);
                if improved {
                    trace!(objective = value, "solver_improved_incumbent");
                    let bools: Vec<bool> = state
                        .assignment
                        .iter()
                        .map(|v| v.expect("leaf is complete"))
                        .collect();
                    *state.best = Some((value, bools, point));
                }
            }
        }
    }

    /// Minimize the objective subject to the active constraints, with each
    /// real variable encoded through its presolved bounds.
    fn solve_lp(
        &self,
        active: &[&LinConstraint],
        lower: &[Option<f64>],
        upper: &[Option<f64>],
    ) -> LpOutcome {
        let n = self.real_names.len();

        // Column layout per variable: shifted single column when a finite
        // lower bound is known, reflected single column for an upper bound
        // alone, and a +/- split for genuinely free variables.
        let mut column_of = Vec::with_capacity(n);
        let mut columns = 0usize;
        for v in 0..n {
            match (lower[v], upper[v]) {
                (Some(_), _) => {
                    column_of.push(VarColumns::Shifted(columns));
                    columns += 1;
                }
                (None, Some(_)) => {
                    column_of.push(VarColumns::Reflected(columns));
                    columns += 1;
                }
                (None, None) => {
                    column_of.push(VarColumns::Split(columns, columns + 1));
                    columns += 2;
                }
            }
        }

        let mut rows: Vec<(Vec<f64>, LinCmp, f64)> = Vec::new();
        let mut add_row = |expr: &LinExpr, cmp: LinCmp, bound: f64| {
            let mut coeffs = vec![0.0; columns];
            let mut rhs = bound;
            for (c, var) in &expr.terms {
                match column_of[var.0] {
                    VarColumns::Shifted(j) => {
                        coeffs[j] += c;
                        rhs -= c * lower[var.0].expect("shifted has a lower bound");
                    }
                    VarColumns::Reflected(j) => {
                        coeffs[j] -= c;
                        rhs -= c * upper[var.0].expect("reflected has an upper bound");
                    }
                    VarColumns::Split(jp, jn) => {
                        coeffs[jp] += c;
                        coeffs[jn] -= c;
                    }
                }
            }
            rows.push((coeffs, cmp, rhs));
        };

        for constraint in active {
            add_row(&constraint.expr, constraint.cmp, constraint.bound);
        }
        // a variable with both bounds keeps its upper bound as a row
        for v in 0..n {
            if let (Some(l), Some(u)) = (lower[v], upper[v]) {
                let VarColumns::Shifted(j) = column_of[v] else {
                    unreachable!("double-bounded variables are shifted");
                };
                let mut coeffs = vec![0.0; columns];
                coeffs[j] = 1.0;
                rows.push((coeffs, LinCmp::Le, u - l));
            }
        }

        let mut objective = vec![0.0; columns];
        let mut offset = 0.0;
        if let Some(obj) = self.objective {
            match column_of[obj.0] {
                VarColumns::Shifted(j) => {
                    objective[j] = 1.0;
                    offset = lower[obj.0].expect("shifted has a lower bound");
                }
                VarColumns::Reflected(j) => {
                    objective[j] = -1.0;
                    offset = upper[obj.0].expect("reflected has an upper bound");
                }
                VarColumns::Split(jp, jn) => {
                    objective[jp] = 1.0;
                    objective[jn] = -1.0;
                }
            }
        }

        match simplex(&rows, &objective) {
            SimplexOutcome::Infeasible => LpOutcome::Infeasible,
            SimplexOutcome::Unbounded => LpOutcome::Optimal {
                value: f64::NEG_INFINITY,
                point: vec![0.0; n],
            },
            SimplexOutcome::Optimal { value, x } => {
                let mut point = vec![0.0; n];
                for v in 0..n {
                    point[v] = match column_of[v] {
                        VarColumns::Shifted(j) => x[j] + lower[v].expect("bounded"),
                        VarColumns::Reflected(j) => upper[v].expect("bounded") - x[j],
                        VarColumns::Split(jp, jn) => x[jp] - x[jn],
                    };
                }
                LpOutcome::Optimal {
                    value: value + offset,
                    point,
                }
            }
        }
    }
}

impl Default for BranchBoundSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for BranchBoundSolver {
    fn declare_bool(&mut self, name: &str) -> BoolVar {
        let id = BoolVar(self.bool_names.len());
        self.bool_names.push(name.to_string());
        id
    }

    fn declare_real(&mut self, name: &str) -> RealVar {
        let id = RealVar(self.real_names.len());
        self.real_names.push(name.to_string());
        id
    }

    fn assert_clause(&mut self, clause: Vec<ClauseAtom>) {
        self.clauses.push(clause);
    }

    fn minimize(&mut self, objective: RealVar) {
        self.objective = Some(objective);
    }

    fn check(&mut self) -> SolveStatus {
        let (lower, upper, bound_consumed) = self.presolve_bounds();
        let mut assignment = vec![None; self.bool_names.len()];
        let mut best = None;

        let mut state = SearchState {
            assignment: &mut assignment,
            best: &mut best,
            lower: &lower,
            upper: &upper,
            bound_consumed: &bound_consumed,
            start: Instant::now(),
            timed_out: false,
            unsupported: false,
        };
        self.search(&mut state);

        let timed_out = state.timed_out;
        let unsupported = state.unsupported;
        if timed_out || unsupported {
            debug!(timed_out, unsupported, "solver_gave_up");
            return SolveStatus::Unknown;
        }
        match best {
            Some((value, bools, reals)) => {
                debug!(objective = value, "solver_found_optimum");
                self.model_bools = bools;
                self.model_reals = reals;
                SolveStatus::Satisfied
            }
            None => SolveStatus::Unsatisfiable,
        }
    }

    fn bool_value(&self, var: BoolVar) -> bool {
        self.model_bools[var.0]
    }

    fn real_value(&self, var: RealVar) -> f64 {
        self.model_reals[var.0]
    }
}

enum Propagation {
    Conflict,
    Forced(usize, bool),
    Stable,
}

#[derive(Clone, Copy)]
enum VarColumns {
    Shifted(usize),
    Reflected(usize),
    Split(usize, usize),
}

struct SearchState<'a> {
    assignment: &'a mut Vec<Option<bool>>,
    best: &'a mut Option<(f64, Vec<bool>, Vec<f64>)>,
    lower: &'a [Option<f64>],
    upper: &'a [Option<f64>],
    bound_consumed: &'a [bool],
    start: Instant,
    timed_out: bool,
    unsupported: bool,
}

enum LpOutcome {
    Infeasible,
    Optimal { value: f64, point: Vec<f64> },
}

enum SimplexOutcome {
    Infeasible,
    Unbounded,
    Optimal { value: f64, x: Vec<f64> },
}

/// Two-phase dense simplex with Bland's rule, minimizing `objective` over
/// `rows` with all columns nonnegative.
fn simplex(rows: &[(Vec<f64>, LinCmp, f64)], objective: &[f64]) -> SimplexOutcome {
    let structural = objective.len();
    let m = rows.len();
    if m == 0 {
        return SimplexOutcome::Optimal {
            value: 0.0,
            x: vec![0.0; structural],
        };
    }

    // Normalize to nonnegative right-hand sides, then add one slack or
    // surplus column per row and artificials where the basis needs them.
    let mut normalized: Vec<(Vec<f64>, LinCmp, f64)> = Vec::with_capacity(m);
    for (coeffs, cmp, rhs) in rows {
        if *rhs < 0.0 {
            let flipped: Vec<f64> = coeffs.iter().map(|c| -c).collect();
            let cmp = match cmp {
                LinCmp::Ge => LinCmp::Le,
                LinCmp::Le => LinCmp::Ge,
            };
            normalized.push((flipped, cmp, -rhs));
        } else {
            normalized.push((coeffs.clone(), *cmp, *rhs));
        }
    }

    let artificial_rows: Vec<usize> = normalized
        .iter()
        .enumerate()
        .filter(|(_, (_, cmp, _))| *cmp == LinCmp::Ge)
        .map(|(i, _)| i)
        .collect();
    let slack_base = structural;
    let artificial_base = slack_base + m;
    let total = artificial_base + artificial_rows.len();

    let mut tableau: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut rhs: Vec<f64> = Vec::with_capacity(m);
    let mut basis: Vec<usize> = Vec::with_capacity(m);
    let mut next_artificial = artificial_base;

    for (i, (coeffs, cmp, b)) in normalized.iter().enumerate() {
        let mut row = vec![0.0; total];
        row[..structural].copy_from_slice(coeffs);
        match cmp {
            LinCmp::Le => {
                row[slack_base + i] = 1.0;
                basis.push(slack_base + i);
            }
            LinCmp::Ge => {
                row[slack_base + i] = -1.0;
                row[next_artificial] = 1.0;
                basis.push(next_artificial);
                next_artificial += 1;
            }
        }
        tableau.push(row);
        rhs.push(*b);
    }

    // Phase 1: minimize the sum of artificials.
    if !artificial_rows.is_empty() {
        let mut phase1 = vec![0.0; total];
        for j in artificial_base..total {
            phase1[j] = 1.0;
        }
        let feasibility = run_simplex(&mut tableau, &mut rhs, &mut basis, &phase1);
        match feasibility {
            SimplexRun::Unbounded => return SimplexOutcome::Infeasible,
            SimplexRun::Optimal(value) => {
                if value > EPS {
                    return SimplexOutcome::Infeasible;
                }
            }
        }
        // Drive surviving artificials out of the basis so phase 2 cannot
        // reactivate them.
        for i in 0..basis.len() {
            if basis[i] >= artificial_base {
                if let Some(j) = (0..artificial_base).find(|j| tableau[i][*j].abs() > EPS) {
                    pivot(&mut tableau, &mut rhs, &mut basis, i, j);
                }
            }
        }
    }

    let mut phase2 = vec![0.0; total];
    phase2[..structural].copy_from_slice(objective);
    match run_simplex(&mut tableau, &mut rhs, &mut basis, &phase2) {
        SimplexRun::Unbounded => SimplexOutcome::Unbounded,
        SimplexRun::Optimal(value) => {
            // A degenerate artificial may remain basic at zero; its value
            // contributes nothing.
            let mut x = vec![0.0; structural];
            for (i, &b) in basis.iter().enumerate() {
                if b < structural {
                    x[b] = rhs[i];
                }
            }
            SimplexOutcome::Optimal { value, x }
        }
    }
}

enum SimplexRun {
    Optimal(f64),
    Unbounded,
}

fn run_simplex(
    tableau: &mut [Vec<f64>],
    rhs: &mut [f64],
    basis: &mut [usize],
    costs: &[f64],
) -> SimplexRun {
    let total = costs.len();

    loop {
        // reduced costs under the current basis
        let mut reduced = costs.to_vec();
        let mut objective = 0.0;
        for (i, &b) in basis.iter().enumerate() {
            let cb = costs[b];
            if cb.abs() > 0.0 {
                objective += cb * rhs[i];
                for j in 0..total {
                    reduced[j] -= cb * tableau[i][j];
                }
            }
        }

        // Bland: smallest-index entering column with negative reduced cost
        let Some(entering) = (0..total).find(|j| reduced[*j] < -EPS) else {
            return SimplexRun::Optimal(objective);
        };

        let mut leaving: Option<(usize, f64)> = None;
        for i in 0..tableau.len() {
            let a = tableau[i][entering];
            if a > EPS {
                let ratio = rhs[i] / a;
                let better = match leaving {
                    None => true,
                    Some((li, lr)) => {
                        ratio < lr - EPS || (ratio < lr + EPS && basis[i] < basis[li])
                    }
                };
                if better {
                    leaving = Some((i, ratio));
                }
            }
        }
        let Some((row, _)) = leaving else {
            return SimplexRun::Unbounded;
        };

        pivot_slices(tableau, rhs, basis, row, entering);
    }
}

fn pivot(
    tableau: &mut Vec<Vec<f64>>,
    rhs: &mut Vec<f64>,
    basis: &mut Vec<usize>,
    row: usize,
    col: usize,
) {
    pivot_slices(tableau, rhs, basis, row, col);
}

fn pivot_slices(
    tableau: &mut [Vec<f64>],
    rhs: &mut [f64],
    basis: &mut [usize],
    row: usize,
    col: usize,
) {
    let factor = tableau[row][col];
    for value in tableau[row].iter_mut() {
        *value /= factor;
    }
    rhs[row] /= factor;

    for i in 0..tableau.len() {
        if i == row {
            continue;
        }
        let scale = tableau[i][col];
        if scale.abs() > 0.0 {
            for j in 0..tableau[i].len() {
                tableau[i][j] -= scale * tableau[row][j];
            }
            rhs[i] -= scale * rhs[row];
        }
    }
    basis[row] = col;
}
