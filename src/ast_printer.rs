use crate::expr::{Expr, LiteralValue};

/// Renders an expression in fully parenthesised prefix form:
/// `(* (- 123.0) (group 45.67))`.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => literal(lit, true),

            Expr::Grouping(inner) => format!("(group {})", Self::print(inner)),

            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            // ── names ───────────────────────────────────────────────────
            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),

            // ── calls and properties ────────────────────────────────────
            Expr::Call {
                callee, arguments, ..
            } => {
                let mut s = format!("(call {}", Self::print(callee));
                for arg in arguments {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            Expr::Get { object, name } => format!("(. {} {})", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(= (. {} {}) {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),

            Expr::Lambda(decl) => {
                let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();
                format!("(fun ({}))", params.join(" "))
            }
        }
    }
}

/// Renders an expression in reverse Polish notation: operands first, then the
/// operator, so `(1 + 2) * 3` prints as `(1 2 +) 3 *`. Grouping parentheses are
/// kept to show where the source had them.
pub struct RpnPrinter;

impl RpnPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            Expr::Literal(lit) => literal(lit, false),

            Expr::Grouping(inner) => format!("({})", Self::print(inner)),

            Expr::Unary { operator, right } => format!("{} {}", Self::print(right), operator.lexeme),

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "{} {} {}",
                Self::print(left),
                Self::print(right),
                operator.lexeme
            ),

            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => format!("{} {} =", Self::print(value), name.lexeme),

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("super {} .", method.lexeme),

            Expr::Call {
                callee, arguments, ..
            } => {
                let mut parts: Vec<String> = arguments.iter().map(Self::print).collect();
                parts.push(Self::print(callee));
                parts.push(format!("call/{}", arguments.len()));
                parts.join(" ")
            }

            Expr::Get { object, name } => format!("{} {} .", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "{} {} {} .=",
                Self::print(object),
                Self::print(value),
                name.lexeme
            ),

            Expr::Lambda(decl) => format!("<fn/{}>", decl.arity()),
        }
    }
}

fn literal(lit: &LiteralValue, trailing_zero: bool) -> String {
    match lit {
        LiteralValue::True => "true".into(),

        LiteralValue::False => "false".into(),

        LiteralValue::Nil => "nil".into(),

        LiteralValue::Str(s) => s.clone(),

        LiteralValue::Number(n) => {
            if n.fract() == 0.0 {
                // 3.0 → "3.0" in prefix form, "3" in RPN
                if trailing_zero {
                    format!("{:.1}", n)
                } else {
                    format!("{:.0}", n)
                }
            } else {
                n.to_string()
            }
        }
    }
}
