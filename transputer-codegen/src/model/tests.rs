use super::*;
use crate::ast::BinaryOp;

fn model() -> AssemblyModel {
    AssemblyModel::new(Casing::Insensitive)
}

fn add_line(model: &mut AssemblyModel, number: u32) -> LineRef {
    let index = model.append_line(Line::new(
        crate::ast::SourceLocation::new("test.asm", number),
        "",
        None,
        None,
    ));
    LineRef { index, number }
}

fn storage_data(model: &AssemblyModel, id: StorageId) -> Vec<i32> {
    model.storage(id).data.clone()
}

#[test]
fn dollar_exists_as_a_variable_from_the_start() {
    let model = model();
    let dollar = model.name(DOLLAR);
    assert_eq!(model.variable(&dollar), Some(0));
    assert_eq!(model.dollar(), 0);
}

#[test]
fn silent_dollar_updates_record_no_assignment() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    model.set_dollar_silently(0x100);
    model.increment_dollar(4);
    assert_eq!(model.dollar(), 0x104);
    assert!(model.sourced_values_for_line_index(line.index).is_empty());

    model.set_dollar(0x200, line).unwrap();
    assert_eq!(model.dollar(), 0x200);
    assert_eq!(model.sourced_values_for_line_index(line.index).len(), 1);
}

#[test]
fn label_cannot_override_a_constant() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    model.set_constant(model.name("FOO"), 5, line1).unwrap();
    let err = model
        .set_label(model.name("FOO"), 0, line2)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Label 'FOO' cannot override existing constant; defined on line 1"
    );
}

#[test]
fn constants_are_single_assignment_outside_convergence() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    model.set_constant(model.name("K"), 1, line1).unwrap();
    let err = model.set_constant(model.name("K"), 2, line2).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Constant 'K' cannot override existing constant; defined on line 1"
    );
}

#[test]
fn convergence_mode_permits_constant_and_label_rewrites() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    model.set_constant(model.name("K"), 1, line1).unwrap();
    model.set_label(model.name("L"), 8, line1).unwrap();
    model.set_convergence_mode(true);
    model.set_constant(model.name("K"), 2, line2).unwrap();
    model.set_label(model.name("L"), 9, line2).unwrap();
    assert_eq!(model.constant(&model.name("K")), Some(2));
    assert_eq!(model.label(&model.name("L")), Some(9));
}

#[test]
fn variables_are_freely_reassignable() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    model.set_variable(model.name("V"), 1, line).unwrap();
    model.set_variable(model.name("V"), 2, line).unwrap();
    assert_eq!(model.variable(&model.name("V")), Some(2));
}

#[test]
fn character_lists_expand_to_one_cell_each() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    let id = model
        .allocate_storage_for_line(
            line,
            CellWidth::Byte,
            &[Expression::Characters("AB".to_owned()), Expression::Num(0)],
        )
        .unwrap();
    assert_eq!(storage_data(&model, id), vec![0x41, 0x42, 0]);
    assert_eq!(model.dollar(), 3);
}

#[test]
fn storage_advances_dollar_by_the_block_size() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    model.set_dollar_silently(0x10);
    let id = model
        .allocate_storage_for_line(
            line,
            CellWidth::DoubleWord,
            &[Expression::Num(1), Expression::Num(2)],
        )
        .unwrap();
    assert_eq!(model.storage(id).address, 0x10);
    assert_eq!(model.dollar(), 0x18);
}

#[test]
fn oversized_data_is_rejected() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    let err = model
        .allocate_storage_for_line(line, CellWidth::Byte, &[Expression::Num(256)])
        .unwrap_err();
    assert_eq!(err.to_string(), "Value of 256 cannot be expressed in a BYTE");

    let err = model
        .allocate_storage_for_line(line, CellWidth::Word, &[Expression::Num(-200)])
        .unwrap_err();
    assert_eq!(err.to_string(), "Value of -200 cannot be expressed in a WORD");

    // any 32-bit value fits a double word via two's complement
    model
        .allocate_storage_for_line(line, CellWidth::DoubleWord, &[Expression::Num(-1)])
        .unwrap();
}

#[test]
fn storage_fixup_rewrites_cells_when_the_name_arrives() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    let id = model
        .allocate_storage_for_line(line1, CellWidth::Word, &[Expression::symbol("later")])
        .unwrap();
    assert_eq!(storage_data(&model, id), vec![0]);
    assert!(model.check_unresolved_forward_references().is_err());

    model.set_label(model.name("LATER"), 0x123, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![0x123]);
    assert!(model.check_unresolved_forward_references().is_ok());
}

#[test]
fn label_resolution_keeps_the_storage_change_tracked() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    let id = model
        .allocate_storage_for_line(line1, CellWidth::Word, &[Expression::symbol("L")])
        .unwrap();
    model.set_label(model.name("L"), 0x10, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![0x10]);

    // convergence shifts the label; the cell follows
    model.set_convergence_mode(true);
    model.set_label(model.name("L"), 0x11, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![0x11]);
}

#[test]
fn variable_resolution_is_not_chased_afterwards() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    let id = model
        .allocate_storage_for_line(line1, CellWidth::Word, &[Expression::symbol("V")])
        .unwrap();
    model.set_variable(model.name("V"), 7, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![7]);

    model.set_variable(model.name("V"), 8, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![7]);
}

#[test]
fn partially_resolved_cells_stay_zero_until_their_turn() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    let expr = Expression::binary(
        BinaryOp::Add,
        Expression::symbol("A"),
        Expression::symbol("B"),
    );
    let id = model
        .allocate_storage_for_line(line1, CellWidth::Word, &[expr])
        .unwrap();
    model.set_label(model.name("A"), 1, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![0]);
    model.set_label(model.name("B"), 2, line2).unwrap();
    assert_eq!(storage_data(&model, id), vec![3]);
}

#[test]
fn pending_assignments_resolve_transitively() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    let line3 = add_line(&mut model, 3);

    // A EQU B, B EQU C, then C appears: both settle in one fixup cascade
    model.record_symbol_forward_reference(
        [model.name("B")].into(),
        model.name("A"),
        &Expression::symbol("B"),
        line1,
        SymbolKind::Constant,
    );
    model.record_symbol_forward_reference(
        [model.name("C")].into(),
        model.name("B"),
        &Expression::symbol("C"),
        line2,
        SymbolKind::Constant,
    );
    assert!(model.check_unresolved_forward_references().is_err());

    model.set_label(model.name("C"), 42, line3).unwrap();
    assert_eq!(model.constant(&model.name("B")), Some(42));
    assert_eq!(model.constant(&model.name("A")), Some(42));
    assert!(model.check_unresolved_forward_references().is_ok());
}

#[test]
fn pending_variable_assignments_are_discharged_once() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);

    model.record_symbol_forward_reference(
        [model.name("SRC")].into(),
        model.name("DST"),
        &Expression::symbol("SRC"),
        line1,
        SymbolKind::Variable,
    );
    model.set_variable(model.name("SRC"), 5, line2).unwrap();
    assert_eq!(model.variable(&model.name("DST")), Some(5));

    // later reassignments of SRC no longer touch DST
    model.set_variable(model.name("SRC"), 6, line2).unwrap();
    assert_eq!(model.variable(&model.name("DST")), Some(5));
}

#[test]
fn unresolved_references_list_names_and_lines() {
    let mut model = model();
    let line2 = add_line(&mut model, 2);
    let line5 = add_line(&mut model, 5);
    let line3 = add_line(&mut model, 3);
    model
        .allocate_storage_for_line(line2, CellWidth::Byte, &[Expression::symbol("zebra")])
        .unwrap();
    model
        .allocate_storage_for_line(line5, CellWidth::Byte, &[Expression::symbol("ZEBRA")])
        .unwrap();
    model.record_symbol_forward_reference(
        [model.name("aard")].into(),
        model.name("X"),
        &Expression::symbol("aard"),
        line3,
        SymbolKind::Constant,
    );
    let err = model.check_unresolved_forward_references().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Forward references remain unresolved at end of Pass 1: (AARD: #3; ZEBRA: #2, #5)"
    );
}

#[test]
fn cleared_lines_leave_the_fixup_table() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    model
        .allocate_storage_for_line(line1, CellWidth::Byte, &[Expression::symbol("N")])
        .unwrap();
    model.clear_sourced_values_for_line_index(line1.index);
    assert!(model.sourced_values_for_line_index(line1.index).is_empty());

    // nothing is waiting on N any more
    model.set_label(model.name("N"), 1, line2).unwrap();
    assert!(model.check_unresolved_forward_references().is_ok());
}

#[test]
fn storage_bounds_cover_live_storages_only() {
    let mut model = model();
    let line1 = add_line(&mut model, 1);
    let line2 = add_line(&mut model, 2);
    assert_eq!(model.lowest_storage_address(), None);

    model.set_dollar_silently(0x20);
    model
        .allocate_storage_for_line(line1, CellWidth::Byte, &[Expression::Num(1)])
        .unwrap();
    model.set_dollar_silently(0x40);
    model
        .allocate_storage_for_line(line2, CellWidth::DoubleWord, &[Expression::Num(2)])
        .unwrap();
    assert_eq!(model.lowest_storage_address(), Some(0x20));
    assert_eq!(model.highest_storage_address(), Some(0x43));

    model.clear_sourced_values_for_line_index(line1.index);
    assert_eq!(model.lowest_storage_address(), Some(0x40));
}

#[test]
fn symbol_table_lists_labels_and_constants_sorted() {
    let mut model = model();
    let line = add_line(&mut model, 1);
    model.set_label(model.name("zulu"), 3, line).unwrap();
    model.set_constant(model.name("alpha"), 1, line).unwrap();
    model.set_variable(model.name("mike"), 2, line).unwrap();
    let table = model.symbol_table();
    let names: Vec<&str> = table.iter().map(|(name, _)| name.key()).collect();
    assert_eq!(names, vec!["ALPHA", "ZULU"]);
}

#[test]
fn assignments_are_recorded_against_their_line() {
    let mut model = model();
    let line = add_line(&mut model, 4);
    model.set_constant(model.name("K"), 9, line).unwrap();
    let values = model.sourced_values_for_line_index(line.index);
    assert_eq!(
        values,
        &[SourcedValue::Assignment(AssignmentValue {
            value: 9,
            kind: SymbolKind::Constant,
            line: 4,
        })]
    );
}
