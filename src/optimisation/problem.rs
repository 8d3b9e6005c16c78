//! A labelled linear problem which can be re-solved after changing variable bounds.
//!
//! HiGHS problems cannot be edited once handed to the solver, so the columns and rows are kept
//! here and converted to a [`highs::RowProblem`] for every solve.
use highs::{RowProblem, Sense};
use indexmap::IndexMap;
use std::ops::{Bound, RangeBounds};

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord)]
pub struct Variable(usize);

impl Variable {
    /// The index of the variable's column
    pub fn index(self) -> usize {
        self.0
    }
}

/// The family a constraint belongs to, used in diagnostics and debug output
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ConstraintFamily {
    /// Path flows meet demand
    Demand,
    /// Arc flows match the path flows using the arc
    PathArc,
    /// Empty vehicle arc flows match empty vehicle path flows
    PathArcBalancing,
    /// Vehicles are conserved at nodes
    FleetBalance,
    /// Total emissions of a period
    Emissions,
    /// Emissions relative to the first period
    EmissionCap,
    /// Arc flows within edge capacity
    Capacity,
    /// An edge is expanded at most once
    ExpansionLimit,
    /// Terminal throughput within capacity
    TerminalCapacity,
    /// A terminal is expanded at most once
    TerminalExpansionLimit,
    /// Flows of a fuel within charging capacity
    Charging,
    /// Flows of a fuel only on upgraded edges
    Upgrade,
    /// An edge is upgraded at most once
    UpgradeLimit,
    /// Transport amount of a technology
    TransportAmount,
    /// Technology share within its readiness
    TechMaturity,
    /// Technology share within its phase-out restriction
    PhaseOut,
    /// Initial fuel mix
    InitFuelShare,
    /// Initial mode mix
    InitModeShare,
    /// Yearly transport amounts agree at decision years
    AuxTransportAmount,
    /// Total transport amount of a mode
    ModeTotal,
    /// Limit on how fast a mode shrinks
    ModalShiftDecrease,
    /// Limit on how fast a mode grows
    ModalShiftIncrease,
    /// Limit on how fast a fleet is replaced
    FleetRenewal,
    /// Decrease in a technology's transport amount
    TransportDecrease,
    /// Diffusion in the first period
    BassFirstPeriod,
    /// Yearly diffusion growth
    BassGrowth,
    /// A cost component of a period
    CostComponent,
    /// Discounted cost of a period
    StageCost,
    /// Total first-stage cost
    FirstStageCost,
    /// Total second-stage cost
    SecondStageCost,
    /// Second-stage cost in excess of the value at risk
    CvarPositive,
    /// First-stage decisions agree across scenarios
    NonAnticipativity,
}

#[derive(PartialEq, Debug, Clone)]
struct Column {
    cost: f64,
    lower: f64,
    upper: f64,
    integer: bool,
    label: String,
}

/// A row of the problem: `lower <= sum(coeff * var) <= upper`
#[derive(PartialEq, Debug, Clone)]
pub struct Row {
    /// The constraint family
    pub family: ConstraintFamily,
    /// The index the row was generated for
    pub label: String,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Coefficients of the variables in the row
    pub terms: Vec<(Variable, f64)>,
}

/// A mixed-integer linear minimisation problem
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Problem {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

fn to_bounds<B: RangeBounds<f64>>(bounds: &B) -> (f64, f64) {
    let lower = match bounds.start_bound() {
        Bound::Included(x) | Bound::Excluded(x) => *x,
        Bound::Unbounded => f64::NEG_INFINITY,
    };
    let upper = match bounds.end_bound() {
        Bound::Included(x) | Bound::Excluded(x) => *x,
        Bound::Unbounded => f64::INFINITY,
    };

    (lower, upper)
}

impl Problem {
    /// Add a continuous variable with the given objective coefficient and bounds
    pub fn add_column<B: RangeBounds<f64>>(&mut self, cost: f64, bounds: B, label: String) -> Variable {
        self.push_column(cost, &bounds, false, label)
    }

    /// Add an integer variable with the given objective coefficient and bounds
    pub fn add_integer_column<B: RangeBounds<f64>>(
        &mut self,
        cost: f64,
        bounds: B,
        label: String,
    ) -> Variable {
        self.push_column(cost, &bounds, true, label)
    }

    fn push_column<B: RangeBounds<f64>>(
        &mut self,
        cost: f64,
        bounds: &B,
        integer: bool,
        label: String,
    ) -> Variable {
        let (lower, upper) = to_bounds(bounds);
        self.columns.push(Column {
            cost,
            lower,
            upper,
            integer,
            label,
        });

        Variable(self.columns.len() - 1)
    }

    /// Add a constraint.
    ///
    /// Repeated variables have their coefficients summed and zero coefficients are dropped.
    pub fn add_row<B, I>(&mut self, family: ConstraintFamily, label: String, bounds: B, terms: I)
    where
        B: RangeBounds<f64>,
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let mut merged: IndexMap<Variable, f64> = IndexMap::new();
        for (var, coeff) in terms {
            *merged.entry(var).or_default() += coeff;
        }

        let (lower, upper) = to_bounds(&bounds);
        self.rows.push(Row {
            family,
            label,
            lower,
            upper,
            terms: merged.into_iter().filter(|(_, coeff)| *coeff != 0.0).collect(),
        });
    }

    /// The number of variables
    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    /// The number of constraints
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterate over the constraints
    pub fn iter_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// The label of a variable
    pub fn column_label(&self, var: Variable) -> &str {
        &self.columns[var.0].label
    }

    /// The current bounds of a variable
    pub fn bounds(&self, var: Variable) -> (f64, f64) {
        let column = &self.columns[var.0];
        (column.lower, column.upper)
    }

    /// Change the bounds of a variable
    pub fn set_bounds(&mut self, var: Variable, lower: f64, upper: f64) {
        let column = &mut self.columns[var.0];
        column.lower = lower;
        column.upper = upper;
    }

    /// Fix a variable to a value
    pub fn fix(&mut self, var: Variable, value: f64) {
        self.set_bounds(var, value, value);
    }

    /// The objective coefficient of a variable
    pub fn cost(&self, var: Variable) -> f64 {
        self.columns[var.0].cost
    }

    /// Convert to a HiGHS model ready to be solved
    pub fn to_highs(&self) -> highs::Model {
        let mut problem = RowProblem::default();
        let cols: Vec<highs::Col> = self
            .columns
            .iter()
            .map(|column| {
                let bounds = column.lower..=column.upper;
                if column.integer {
                    problem.add_integer_column(column.cost, bounds)
                } else {
                    problem.add_column(column.cost, bounds)
                }
            })
            .collect();

        for row in &self.rows {
            problem.add_row(
                row.lower..=row.upper,
                row.terms.iter().map(|(var, coeff)| (cols[var.0], *coeff)),
            );
        }

        problem.optimise(Sense::Minimise)
    }

    /// Iterate over the variables whose bounds pin them to a single value
    pub fn iter_fixed_columns(&self) -> impl Iterator<Item = Variable> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.lower.total_cmp(&column.upper).is_eq())
            .map(|(i, _)| Variable(i))
    }

    /// Convert to an elastic LP whose optimum is the least total constraint violation.
    ///
    /// Every row gets a non-negative slack on each side and the objective is the sum of slacks.
    /// Fixed variables are released too. Each is bounded below by the smaller of zero and its
    /// fixed value, with no upper bound, and is tied to the fixed value by an extra row with its
    /// own pair of slacks. A fixing which conflicts with the constraints then shows up as a
    /// violation instead of making the elastic problem infeasible. Integrality is dropped.
    ///
    /// Column layout: the problem's own columns, then the slacks of row `i` at
    /// `num_cols() + 2i` (raising the row activity) and `num_cols() + 2i + 1` (lowering it),
    /// then the slacks of the `j`th fixed variable (in [`Self::iter_fixed_columns`] order) at
    /// `num_cols() + 2 * num_rows() + 2j` and the column after it.
    pub fn to_elastic_highs(&self) -> highs::Model {
        let mut problem = RowProblem::default();
        let cols: Vec<highs::Col> = self
            .columns
            .iter()
            .map(|column| {
                if column.lower.total_cmp(&column.upper).is_eq() {
                    problem.add_column(0.0, column.lower.min(0.0)..)
                } else {
                    problem.add_column(0.0, column.lower..=column.upper)
                }
            })
            .collect();
        let mut add_slacks = |count: usize| -> Vec<(highs::Col, highs::Col)> {
            (0..count)
                .map(|_| (problem.add_column(1.0, 0.0..), problem.add_column(1.0, 0.0..)))
                .collect()
        };
        let row_slacks = add_slacks(self.rows.len());
        let fixed: Vec<Variable> = self.iter_fixed_columns().collect();
        let fixed_slacks = add_slacks(fixed.len());

        for (row, (up, down)) in self.rows.iter().zip(row_slacks) {
            let terms = row
                .terms
                .iter()
                .map(|(var, coeff)| (cols[var.0], *coeff))
                .chain([(up, 1.0), (down, -1.0)]);
            problem.add_row(row.lower..=row.upper, terms);
        }
        for (var, (up, down)) in fixed.into_iter().zip(fixed_slacks) {
            let value = self.columns[var.0].lower;
            problem.add_row(value..=value, [(cols[var.0], 1.0), (up, 1.0), (down, -1.0)]);
        }

        problem.optimise(Sense::Minimise)
    }
}
