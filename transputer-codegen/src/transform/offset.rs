//! The pre-registered offset rewriter.

use crate::ast::{CellWidth, Expression, Statement, UnaryOp};
use crate::eval::EvaluationError;
use crate::model::AssemblyModel;
use crate::transform::{StatementTransformer, TransformationError};

/// Rewrites address-relative placeholders into fixed-anchor subtractions.
///
/// - A raw [`UnaryOp::Offset`] becomes [`UnaryOp::OffsetFrom`] anchored at
///   the current `$`.
/// - A bare symbol operand of `j`/`cj`/`call` is wrapped in an
///   `OffsetFrom($ + 1)`: branch operands are taken relative to the
///   instruction pointer past the function byte.
/// - Data directives spread the anchor, so the i-th element measures from
///   its own cell address.
/// - `DUP` forms are lowered to flat data directives here; their count must
///   be evaluatable on the spot.
pub struct OffsetTransformer;

impl StatementTransformer for OffsetTransformer {
    fn transform(
        &self,
        model: &AssemblyModel,
        statement: Statement,
    ) -> Result<Statement, TransformationError> {
        let dollar = model.dollar();
        Ok(match statement {
            Statement::Org(expr) => Statement::Org(anchor_offsets(expr, dollar)),
            Statement::ConstantAssignment(name, expr) => {
                Statement::ConstantAssignment(name, anchor_offsets(expr, dollar))
            }
            Statement::VariableAssignment(name, expr) => {
                Statement::VariableAssignment(name, anchor_offsets(expr, dollar))
            }
            Statement::Data(width, exprs) => {
                Statement::Data(width, spread_anchors(exprs, width, dollar))
            }
            Statement::DataDup(width, count, value) => {
                let exprs = repeat_dup(model, dollar, count, value)?;
                Statement::Data(width, spread_anchors(exprs, width, dollar))
            }
            Statement::Direct(function, expr) => {
                let expr = if function.is_ip_relative() && matches!(expr, Expression::SymbolArg(_))
                {
                    Expression::unary(UnaryOp::OffsetFrom(dollar.wrapping_add(1)), expr)
                } else {
                    anchor_offsets(expr, dollar)
                };
                Statement::Direct(function, expr)
            }
            other => other,
        })
    }
}

fn repeat_dup(
    model: &AssemblyModel,
    dollar: i32,
    count: Expression,
    value: Expression,
) -> Result<Vec<Expression>, TransformationError> {
    let count = match model.evaluate_expression(&anchor_offsets(count, dollar)) {
        Ok(count) => count,
        Err(EvaluationError::UndefinedSymbols(names)) => {
            return Err(TransformationError::UndefinedDupCount(names))
        }
        Err(err) => return Err(err.into()),
    };
    if count < 0 {
        return Err(TransformationError::NegativeDupCount(count));
    }
    Ok(vec![value; count as usize])
}

/// Anchor each element at its own cell: `$ + i * width`.
fn spread_anchors(exprs: Vec<Expression>, width: CellWidth, dollar: i32) -> Vec<Expression> {
    exprs
        .into_iter()
        .enumerate()
        .map(|(i, expr)| {
            let anchor = dollar.wrapping_add(i as i32 * width.bytes() as i32);
            anchor_offsets(expr, anchor)
        })
        .collect()
}

fn anchor_offsets(expr: Expression, anchor: i32) -> Expression {
    match expr {
        Expression::Unary(UnaryOp::Offset, operand) => Expression::Unary(
            UnaryOp::OffsetFrom(anchor),
            Box::new(anchor_offsets(*operand, anchor)),
        ),
        Expression::Unary(op, operand) => {
            Expression::Unary(op, Box::new(anchor_offsets(*operand, anchor)))
        }
        Expression::Binary(op, lhs, rhs) => Expression::Binary(
            op,
            Box::new(anchor_offsets(*lhs, anchor)),
            Box::new(anchor_offsets(*rhs, anchor)),
        ),
        leaf => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Line, SourceLocation};
    use crate::model::LineRef;
    use crate::symbol::Casing;
    use transputer_asm::Function;

    fn model_at(dollar: i32) -> AssemblyModel {
        let mut model = AssemblyModel::new(Casing::Insensitive);
        model.set_dollar_silently(dollar);
        model
    }

    #[test]
    fn raw_offset_is_anchored_at_dollar() {
        let model = model_at(0x100);
        let statement = Statement::Org(Expression::unary(
            UnaryOp::Offset,
            Expression::symbol("THERE"),
        ));
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Org(Expression::unary(
                UnaryOp::OffsetFrom(0x100),
                Expression::symbol("THERE"),
            ))
        );
    }

    #[test]
    fn bare_branch_symbols_measure_from_past_the_function_byte() {
        let model = model_at(0x80);
        let statement = Statement::Direct(Function::Call, Expression::symbol("TARGET"));
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Direct(
                Function::Call,
                Expression::unary(UnaryOp::OffsetFrom(0x81), Expression::symbol("TARGET")),
            )
        );
    }

    #[test]
    fn non_branch_instructions_keep_bare_symbols_absolute() {
        let model = model_at(0x80);
        let statement = Statement::Direct(Function::Ldc, Expression::symbol("TARGET"));
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Direct(Function::Ldc, Expression::symbol("TARGET"))
        );
    }

    #[test]
    fn branch_arithmetic_is_not_wrapped() {
        let model = model_at(0x80);
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::symbol("TARGET"),
            Expression::Num(2),
        );
        let statement = Statement::Direct(Function::J, expr.clone());
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(transformed, Statement::Direct(Function::J, expr));
    }

    #[test]
    fn data_elements_anchor_at_their_own_cells() {
        let model = model_at(0x20);
        let offset = || Expression::unary(UnaryOp::Offset, Expression::symbol("X"));
        let statement = Statement::Data(CellWidth::Word, vec![offset(), offset()]);
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Data(
                CellWidth::Word,
                vec![
                    Expression::unary(UnaryOp::OffsetFrom(0x20), Expression::symbol("X")),
                    Expression::unary(UnaryOp::OffsetFrom(0x22), Expression::symbol("X")),
                ]
            )
        );
    }

    #[test]
    fn dup_lowers_to_a_flat_directive() {
        let model = model_at(0);
        let statement =
            Statement::DataDup(CellWidth::Byte, Expression::Num(3), Expression::Num(0x0A));
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Data(
                CellWidth::Byte,
                vec![Expression::Num(0x0A); 3],
            )
        );
    }

    #[test]
    fn dup_count_must_be_defined() {
        let model = model_at(0);
        let statement = Statement::DataDup(
            CellWidth::Byte,
            Expression::symbol("N"),
            Expression::Num(0),
        );
        let err = OffsetTransformer.transform(&model, statement).unwrap_err();
        assert!(matches!(err, TransformationError::UndefinedDupCount(_)));
    }

    #[test]
    fn dup_count_resolves_against_defined_symbols() {
        let mut model = model_at(0);
        let name = model.name("N");
        let line_ref = test_line_ref(&mut model);
        model.set_constant(name, 2, line_ref).unwrap();
        let statement = Statement::DataDup(
            CellWidth::Byte,
            Expression::symbol("n"),
            Expression::Num(7),
        );
        let transformed = OffsetTransformer.transform(&model, statement).unwrap();
        assert_eq!(
            transformed,
            Statement::Data(CellWidth::Byte, vec![Expression::Num(7); 2])
        );
    }

    fn test_line_ref(model: &mut AssemblyModel) -> LineRef {
        let index = model.append_line(Line::new(
            SourceLocation::new("test.asm", 1),
            "",
            None,
            None,
        ));
        LineRef { index, number: 1 }
    }
}
