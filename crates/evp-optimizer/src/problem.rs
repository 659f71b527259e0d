//! 求解器無關的線性整數規劃描述
//!
//! 建模端只往 `LinearProgram` 宣告變數、約束與目標；
//! 任何 MILP 後端都從這份描述翻譯，不需要改動建模邏輯。

use serde::Serialize;
use std::fmt;

/// 變數索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 變數定義域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Domain {
    Binary,
    Integer,
    Continuous,
}

/// 變數宣告
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub domain: Domain,
    pub lower: f64,
    /// None 表示無上界
    pub upper: Option<f64>,
}

impl VariableDecl {
    pub fn is_integral(&self) -> bool {
        !matches!(self.domain, Domain::Continuous)
    }

    /// 上下界是否將變數固定
    pub fn is_fixed(&self) -> bool {
        matches!(self.upper, Some(upper) if (upper - self.lower).abs() < f64::EPSILON)
    }
}

/// 約束關係
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

impl Relation {
    /// 判斷 lhs ⋈ rhs 是否成立（含容差）
    pub fn holds(&self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Relation::Le => lhs <= rhs + tolerance,
            Relation::Ge => lhs >= rhs - tolerance,
            Relation::Eq => (lhs - rhs).abs() <= tolerance,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Relation::Le => "<=",
            Relation::Ge => ">=",
            Relation::Eq => "=",
        };
        f.write_str(symbol)
    }
}

/// 線性表達式 Σ coef·var + constant
#[derive(Debug, Clone, Default)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：加入一項
    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.add(var, coef);
        self
    }

    /// 建構器模式：加入常數
    pub fn constant(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    /// 加入一項（係數為 0 時忽略）
    pub fn add(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_value(&self) -> f64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// 以變數值計算
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.index()).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

/// 線性約束：Σ coef·var ⋈ rhs
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub name: String,
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

/// 目標方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Maximize,
    Minimize,
}

/// 模型規模統計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub variables: usize,
    pub binaries: usize,
    pub integers: usize,
    pub continuous: usize,
    pub constraints: usize,
}

/// 約束違反
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// 約束名稱，或 `bound:變數名`
    pub name: String,
    pub lhs: f64,
    pub relation: Relation,
    pub rhs: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.6} {} {:.6}", self.name, self.lhs, self.relation, self.rhs)
    }
}

/// LP 格式可接受的名稱（其餘字元以底線取代）
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if name.chars().next().map_or(true, |c| c.is_ascii_digit() || c == '.') {
        name.insert(0, '_');
    }
    name
}

/// 線性整數規劃
#[derive(Debug, Clone)]
pub struct LinearProgram {
    pub name: String,
    variables: Vec<VariableDecl>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
    sense: Sense,
}

impl LinearProgram {
    /// 創建空模型
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: LinearExpr::new(),
            sense,
        }
    }

    /// 宣告變數
    pub fn add_variable(&mut self, name: &str, domain: Domain, lower: f64, upper: Option<f64>) -> VarId {
        let (lower, upper) = match domain {
            Domain::Binary => (lower.max(0.0), Some(upper.unwrap_or(1.0).min(1.0))),
            _ => (lower, upper),
        };
        self.variables.push(VariableDecl {
            name: sanitize_name(name),
            domain,
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn binary(&mut self, name: &str) -> VarId {
        self.add_variable(name, Domain::Binary, 0.0, Some(1.0))
    }

    pub fn integer(&mut self, name: &str, lower: f64, upper: Option<f64>) -> VarId {
        self.add_variable(name, Domain::Integer, lower, upper)
    }

    pub fn continuous(&mut self, name: &str, lower: f64, upper: Option<f64>) -> VarId {
        self.add_variable(name, Domain::Continuous, lower, upper)
    }

    /// 宣告約束；表達式中的常數移到右側
    pub fn add_constraint(&mut self, name: &str, expr: LinearExpr, relation: Relation, rhs: f64) -> usize {
        let rhs = rhs - expr.constant_value();
        let expr = LinearExpr {
            terms: expr.terms,
            constant: 0.0,
        };
        self.constraints.push(LinearConstraint {
            name: sanitize_name(name),
            expr,
            relation,
            rhs,
        });
        self.constraints.len() - 1
    }

    /// 設置目標函數
    pub fn set_objective(&mut self, objective: LinearExpr, sense: Sense) {
        self.objective = objective;
        self.sense = sense;
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &VariableDecl {
        &self.variables[id.index()]
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// 依名稱尋找約束
    pub fn find_constraint(&self, name: &str) -> Option<&LinearConstraint> {
        let name = sanitize_name(name);
        self.constraints.iter().find(|c| c.name == name)
    }

    /// 模型規模
    pub fn stats(&self) -> ModelStats {
        let mut stats = ModelStats {
            variables: self.variables.len(),
            constraints: self.constraints.len(),
            ..ModelStats::default()
        };
        for var in &self.variables {
            match var.domain {
                Domain::Binary => stats.binaries += 1,
                Domain::Integer => stats.integers += 1,
                Domain::Continuous => stats.continuous += 1,
            }
        }
        stats
    }

    /// 只保留指定約束的子模型（變數與上下界不變，目標清空）
    pub fn restricted_to(&self, constraint_indices: &[usize]) -> LinearProgram {
        LinearProgram {
            name: format!("{}_subset", self.name),
            variables: self.variables.clone(),
            constraints: constraint_indices
                .iter()
                .filter_map(|i| self.constraints.get(*i).cloned())
                .collect(),
            objective: LinearExpr::new(),
            sense: Sense::Minimize,
        }
    }

    /// 線性鬆弛（所有整數變數改為連續）
    pub fn relaxed(&self) -> LinearProgram {
        let mut relaxed = self.clone();
        relaxed.name = format!("{}_relaxed", self.name);
        for var in &mut relaxed.variables {
            var.domain = Domain::Continuous;
        }
        relaxed
    }

    /// 檢查一組變數值是否滿足上下界、整數性與所有約束
    pub fn check_assignment(&self, values: &[f64], tolerance: f64) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (index, var) in self.variables.iter().enumerate() {
            let value = values.get(index).copied().unwrap_or(0.0);
            let bound_name = format!("bound:{}", var.name);
            if value < var.lower - tolerance {
                violations.push(Violation {
                    name: bound_name.clone(),
                    lhs: value,
                    relation: Relation::Ge,
                    rhs: var.lower,
                });
            }
            if let Some(upper) = var.upper {
                if value > upper + tolerance {
                    violations.push(Violation {
                        name: bound_name.clone(),
                        lhs: value,
                        relation: Relation::Le,
                        rhs: upper,
                    });
                }
            }
            if var.is_integral() && (value - value.round()).abs() > tolerance {
                violations.push(Violation {
                    name: format!("integrality:{}", var.name),
                    lhs: value,
                    relation: Relation::Eq,
                    rhs: value.round(),
                });
            }
        }

        for constraint in &self.constraints {
            let lhs = constraint.expr.evaluate(values);
            // 容差隨右側量級放大
            let scaled = tolerance * (1.0 + constraint.rhs.abs());
            if !constraint.relation.holds(lhs, constraint.rhs, scaled) {
                violations.push(Violation {
                    name: constraint.name.clone(),
                    lhs,
                    relation: constraint.relation,
                    rhs: constraint.rhs,
                });
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> (LinearProgram, VarId, VarId, VarId) {
        let mut lp = LinearProgram::new("sample", Sense::Maximize);
        let y = lp.binary("y[maipu][S1][1]");
        let x = lp.integer("x", 0.0, Some(5.0));
        let s = lp.continuous("s", 0.0, None);
        lp.add_constraint("link", LinearExpr::new().term(x, 1.0).term(y, -5.0), Relation::Le, 0.0);
        lp.add_constraint(
            "energy",
            LinearExpr::new().term(s, 1.0).term(x, -10.0).constant(2.0),
            Relation::Le,
            2.0,
        );
        lp.set_objective(LinearExpr::new().term(s, 1.0), Sense::Maximize);
        (lp, y, x, s)
    }

    #[rstest]
    #[case("y[maipu][S1][1]", "y_maipu__S1__1_")]
    #[case("1abc", "_1abc")]
    #[case("ok_name.2", "ok_name.2")]
    fn test_sanitize_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(raw), expected);
    }

    #[test]
    fn test_constant_moves_to_rhs() {
        let (lp, ..) = sample();
        let energy = lp.find_constraint("energy").unwrap();
        assert_eq!(energy.rhs, 0.0);
        assert_eq!(energy.expr.constant_value(), 0.0);
    }

    #[test]
    fn test_stats() {
        let (lp, ..) = sample();
        assert_eq!(
            lp.stats(),
            ModelStats {
                variables: 3,
                binaries: 1,
                integers: 1,
                continuous: 1,
                constraints: 2,
            }
        );
    }

    #[test]
    fn test_check_assignment() {
        let (lp, ..) = sample();
        assert!(lp.check_assignment(&[1.0, 5.0, 50.0], 1e-6).is_empty());

        let violations = lp.check_assignment(&[0.0, 2.5, 30.0], 1e-6);
        let names: Vec<&str> = violations.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["integrality:x", "link", "energy"]);
    }

    #[test]
    fn test_restricted_and_relaxed() {
        let (lp, ..) = sample();
        let subset = lp.restricted_to(&[1]);
        assert_eq!(subset.constraints().len(), 1);
        assert_eq!(subset.constraints()[0].name, "energy");
        assert!(subset.objective().is_empty());

        let relaxed = lp.relaxed();
        assert_eq!(relaxed.stats().continuous, 3);
    }
}
