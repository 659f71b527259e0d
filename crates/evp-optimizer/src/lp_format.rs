//! CPLEX LP 格式輸出
//!
//! 用於 `model.lp` 與不可行時的 `conflict.ilp`。

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use evp_core::{PlanError, Result};

use crate::problem::{Domain, LinearExpr, LinearProgram, Relation, Sense};

/// 每行最多項數，超過則換行
const TERMS_PER_LINE: usize = 8;

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn render_expr(program: &LinearProgram, expr: &LinearExpr) -> String {
    if expr.is_empty() {
        // 空表達式以 0 係數的第一個變數代替
        return program
            .variables()
            .first()
            .map(|v| format!("0 {}", v.name))
            .unwrap_or_else(|| "0".to_string());
    }

    let mut out = String::new();
    for (i, (var, coef)) in expr.terms().iter().enumerate() {
        if i > 0 && i % TERMS_PER_LINE == 0 {
            out.push_str("\n   ");
        }
        let sign = if *coef < 0.0 { "-" } else { "+" };
        let magnitude = coef.abs();
        let name = &program.variable(*var).name;
        if i == 0 && sign == "+" {
            if magnitude == 1.0 {
                let _ = write!(out, "{name}");
            } else {
                let _ = write!(out, "{} {name}", number(magnitude));
            }
        } else if magnitude == 1.0 {
            let _ = write!(out, " {sign} {name}");
        } else {
            let _ = write!(out, " {sign} {} {name}", number(magnitude));
        }
    }
    out.trim_start().to_string()
}

/// 將模型寫成 LP 文字
pub fn render(program: &LinearProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\\ {}", program.name);
    out.push_str(match program.sense() {
        Sense::Maximize => "Maximize\n",
        Sense::Minimize => "Minimize\n",
    });
    let _ = writeln!(out, " obj: {}", render_expr(program, program.objective()));

    out.push_str("Subject To\n");
    for constraint in program.constraints() {
        let relation = match constraint.relation {
            Relation::Le => "<=",
            Relation::Ge => ">=",
            Relation::Eq => "=",
        };
        let _ = writeln!(
            out,
            " {}: {} {relation} {}",
            constraint.name,
            render_expr(program, &constraint.expr),
            number(constraint.rhs)
        );
    }

    out.push_str("Bounds\n");
    for var in program.variables() {
        if var.domain == Domain::Binary && var.lower == 0.0 && var.upper == Some(1.0) {
            continue;
        }
        match var.upper {
            Some(upper) if var.is_fixed() => {
                let _ = writeln!(out, " {} = {}", var.name, number(upper));
            }
            Some(upper) => {
                let _ = writeln!(out, " {} <= {} <= {}", number(var.lower), var.name, number(upper));
            }
            None if var.lower != 0.0 => {
                let _ = writeln!(out, " {} >= {}", var.name, number(var.lower));
            }
            None => {}
        }
    }

    let section = |out: &mut String, header: &str, domain: Domain| {
        let names: Vec<&str> = program
            .variables()
            .iter()
            .filter(|v| v.domain == domain)
            .map(|v| v.name.as_str())
            .collect();
        if names.is_empty() {
            return;
        }
        let _ = writeln!(out, "{header}");
        for chunk in names.chunks(TERMS_PER_LINE) {
            let _ = writeln!(out, " {}", chunk.join(" "));
        }
    };
    section(&mut out, "General", Domain::Integer);
    section(&mut out, "Binary", Domain::Binary);

    out.push_str("End\n");
    out
}

/// 寫入任意輸出
pub fn write_lp<W: Write>(program: &LinearProgram, writer: &mut W) -> Result<()> {
    writer.write_all(render(program).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// 寫入檔案
pub fn write_lp_file(program: &LinearProgram, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .map_err(|e| PlanError::Model(format!("無法建立 {}: {e}", path.display())))?;
    write_lp(program, &mut file)?;
    tracing::info!("模型已輸出: {}", path.display());
    Ok(())
}
