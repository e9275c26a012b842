#![allow(clippy::unwrap_used)]

use super::*;
use crate::config::ExclusionConfig;
use crate::map::PointKind;
use crate::model::{
    Body, Instruction, Member, MemberKind, MemberRef, MethodId, Module, OpCode, PointId,
    SourceSpan, TypeDef,
};
use std::collections::BTreeMap;

const FILE: &str = "src/Program.cs";

fn at(line: u32) -> SourceSpan {
    SourceSpan::line(FILE, line)
}

fn call(line: u32) -> Instruction {
    Instruction::at(OpCode::op("call", 0, 0), at(line))
}

fn ret(line: u32) -> Instruction {
    Instruction::at(OpCode::Return { pop: 0 }, at(line))
}

/// `if (cond) { a } else { b }` on lines `l..l+3`
fn if_else(l: u32) -> Body {
    Body::new(vec![
        Instruction::at(OpCode::op("ldarg", 0, 1), at(l)),
        Instruction::new(OpCode::Branch { target: 4, pop: 1 }),
        call(l + 1),
        Instruction::new(OpCode::Jump { target: 5 }),
        call(l + 2),
        ret(l + 3),
    ])
}

fn straight(l: u32) -> Body {
    Body::new(vec![call(l), ret(l + 1)])
}

fn hidden_stub() -> Body {
    Body::new(vec![
        Instruction::at(OpCode::op("newobj", 0, 0), SourceSpan::hidden(FILE)),
        Instruction::new(OpCode::Return { pop: 0 }),
    ])
}

fn select(module: &Module) -> Selection {
    PointSelector::new(&ExclusionConfig::default())
        .unwrap()
        .select(module)
}

fn select_with(module: &Module, config: &ExclusionConfig) -> Selection {
    PointSelector::new(config).unwrap().select(module)
}

fn method_of<'s>(selection: &'s Selection, name: &str) -> &'s crate::map::MethodRecord {
    selection
        .methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method record {name}"))
}

#[test]
fn test_line_point_precedes_edges() {
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", if_else(1))));
    let selection = select(&module);

    let kinds: Vec<PointKind> = selection.points.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PointKind::Line,
            PointKind::Branch {
                ordinal: 0,
                edge: 0,
                edges: 2
            },
            PointKind::Branch {
                ordinal: 0,
                edge: 1,
                edges: 2
            },
            PointKind::Line,
            PointKind::Line,
            PointKind::Line,
        ]
    );
    let ids: Vec<u32> = selection.points.iter().map(|p| p.id.as_u32()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(selection.points[1].span.start_line, 1);

    let plan = &selection.plans[0];
    assert_eq!(plan.line_probes[&0], PointId::new(0));
    assert_eq!(plan.edge_probes[&1], vec![PointId::new(1), PointId::new(2)]);
    assert!(!plan.line_probes.contains_key(&3));
    assert_eq!(plan.point_count(), 6);
}

#[test]
fn test_method_record_spans_lines() {
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", if_else(10))));
    let selection = select(&module);
    let f = method_of(&selection, "F");
    assert_eq!(f.id, MethodId::new(0));
    assert_eq!(f.type_name, "App.Program");
    assert_eq!(f.file, FILE);
    assert_eq!((f.first_line, f.last_line), (10, 13));
    assert!(f.parent.is_none());
}

#[test]
fn test_unconditional_jump_is_not_a_branch() {
    let body = Body::new(vec![
        Instruction::at(OpCode::Jump { target: 1 }, at(1)),
        ret(2),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", body)));
    let selection = select(&module);
    assert!(selection
        .points
        .iter()
        .all(|p| p.kind == PointKind::Line));
    assert_eq!(selection.point_count(), 2);
}

#[test]
fn test_hidden_decision_has_no_branch_point() {
    let body = Body::new(vec![
        Instruction::at(OpCode::op("ldloc", 0, 1), SourceSpan::hidden(FILE)),
        Instruction::new(OpCode::Branch { target: 3, pop: 1 }),
        call(5),
        ret(6),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", body)));
    let selection = select(&module);
    assert!(selection
        .points
        .iter()
        .all(|p| p.kind == PointKind::Line));
    assert_eq!(selection.point_count(), 2);
}

#[test]
fn test_hidden_only_member_has_no_record() {
    let module = Module::new("App").with_type(
        TypeDef::new("App.Program")
            .with_member(Member::generated("Stub", hidden_stub()))
            .with_member(Member::method("G", straight(1))),
    );
    let selection = select(&module);
    assert_eq!(selection.methods.len(), 1);
    assert_eq!(selection.methods[0].name, "G");
    assert_eq!(selection.plans.len(), 1);
}

#[test]
fn test_decisions_on_one_line_get_increasing_ordinals() {
    // `if (a && b)` compiles to two decisions on the same line
    let body = Body::new(vec![
        Instruction::at(OpCode::op("ldarg", 0, 1), at(3)),
        Instruction::new(OpCode::Branch { target: 5, pop: 1 }),
        Instruction::new(OpCode::op("ldarg", 0, 1)),
        Instruction::new(OpCode::Branch { target: 5, pop: 1 }),
        call(4),
        ret(5),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", body)));
    let selection = select(&module);
    let ordinals: Vec<u32> = selection
        .points
        .iter()
        .filter_map(|p| match p.kind {
            PointKind::Branch { ordinal, .. } => Some(ordinal),
            PointKind::Line => None,
        })
        .collect();
    assert_eq!(ordinals, vec![0, 0, 1, 1]);
}

#[test]
fn test_switch_edges() {
    let body = Body::new(vec![
        Instruction::at(OpCode::op("ldarg", 0, 1), at(1)),
        Instruction::new(OpCode::Switch {
            targets: vec![3, 4, 4],
        }),
        call(2),
        call(3),
        ret(4),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", body)));
    let selection = select(&module);
    let edges: Vec<(u32, u32)> = selection
        .points
        .iter()
        .filter_map(|p| match p.kind {
            PointKind::Branch { edge, edges, .. } => Some((edge, edges)),
            PointKind::Line => None,
        })
        .collect();
    assert_eq!(edges, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
}

fn async_module(link: bool) -> Module {
    let mut stub = Member::method("RunAsync", hidden_stub());
    if link {
        stub = stub.with_state_machine("App.Program/<RunAsync>d__1");
    }
    Module::new("App")
        .with_type(
            TypeDef::new("App.Program")
                .with_member(Member::method("Main", straight(1)))
                .with_member(stub),
        )
        .with_type(
            TypeDef::generated("App.Program", "<RunAsync>d__1")
                .with_member(Member::generated("MoveNext", if_else(20)))
                .with_member(Member::generated("SetStateMachine", hidden_stub())),
        )
}

#[test]
fn test_async_state_machine_via_explicit_link() {
    let selection = select(&async_module(true));
    let run = method_of(&selection, "RunAsync");
    assert_eq!(run.type_name, "App.Program");
    assert_eq!((run.first_line, run.last_line), (20, 23));
    assert!(selection
        .points
        .iter()
        .filter(|p| p.span.start_line >= 20)
        .all(|p| p.method == run.id));
    assert!(selection.methods.iter().all(|m| m.name != "MoveNext"));
}

#[test]
fn test_iterator_state_machine_via_generated_name() {
    let selection = select(&async_module(false));
    let run = method_of(&selection, "RunAsync");
    assert_eq!(selection.methods.len(), 2);
    assert_eq!(
        selection
            .points
            .iter()
            .filter(|p| p.method == run.id)
            .count(),
        6
    );
}

fn closures_module(exclude_main: bool) -> Module {
    let mut main = Member::method("Main", straight(1));
    if exclude_main {
        main = main.with_attribute("ExcludeFromCodeCoverage");
    }
    Module::new("App")
        .with_type(
            TypeDef::new("App.Program")
                .with_member(main)
                .with_member(Member::generated("<Main>g__Helper|0_0", straight(5)))
                .with_member(Member::method("Other", straight(30))),
        )
        .with_type(
            TypeDef::generated("App.Program", "<>c")
                .with_member(Member::generated("<Main>b__0_0", straight(10))),
        )
        .with_type(
            TypeDef::generated("App.Program", "<<Main>g__Helper|0_0>d")
                .with_member(Member::generated("MoveNext", straight(15))),
        )
}

#[test]
fn test_local_function_and_lambda_records() {
    let selection = select(&closures_module(false));
    let helper = method_of(&selection, "Helper");
    assert_eq!(helper.parent.as_deref(), Some("Main"));
    assert_eq!(helper.type_name, "App.Program");
    let lambda = method_of(&selection, "lambda_0_0");
    assert_eq!(lambda.parent.as_deref(), Some("Main"));
    assert_eq!(lambda.type_name, "App.Program");
    assert_ne!(helper.id, lambda.id);
    assert_ne!(method_of(&selection, "Main").id, helper.id);
}

#[test]
fn test_state_machine_of_local_function_joins_its_record() {
    let selection = select(&closures_module(false));
    let helper = method_of(&selection, "Helper");
    assert_eq!((helper.first_line, helper.last_line), (5, 16));
    assert_eq!(selection.methods.len(), 4);
}

#[test]
fn test_exclusion_propagates_to_generated_code() {
    let selection = select(&closures_module(true));
    let names: Vec<&str> = selection.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Other"]);
    let excluded: Vec<&str> = selection
        .excluded
        .iter()
        .map(|e| e.member.as_str())
        .collect();
    assert_eq!(
        excluded,
        vec![
            "App.Program::Main",
            "App.Program::<Main>g__Helper|0_0",
            "App.Program/<>c::<Main>b__0_0",
            "App.Program/<<Main>g__Helper|0_0>d::MoveNext",
        ]
    );
    assert!(selection.excluded.iter().all(|e| e.reason.contains("ExcludeFromCodeCoverage")));
}

#[test]
fn test_async_exclusion_follows_origin() {
    let mut module = async_module(true);
    module.types[0].members[1]
        .attributes
        .push("ExcludeFromCodeCoverageAttribute".into());
    let selection = select(&module);
    assert!(selection.methods.iter().all(|m| m.name == "Main"));
    assert!(selection
        .excluded
        .iter()
        .any(|e| e.member.ends_with("MoveNext")));
}

#[test]
fn test_excluded_type_covers_nested_types() {
    let mut module = closures_module(false);
    module.types[0].attributes.push("ExcludeFromCoverage".into());
    let selection = select(&module);
    assert!(selection.points.is_empty());
    assert_eq!(selection.excluded.len(), 5);
}

#[test]
fn test_type_glob_exclusion() {
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Generated.Dto").with_member(Member::method("Get", straight(1))))
        .with_type(TypeDef::new("App.Service").with_member(Member::method("Run", straight(5))));
    let config = ExclusionConfig::default().exclude_type("App.Generated.*");
    let selection = select_with(&module, &config);
    assert_eq!(selection.methods.len(), 1);
    assert_eq!(selection.methods[0].type_name, "App.Service");
    assert_eq!(selection.points[0].id, PointId::new(0));
}

#[test]
fn test_module_marker_excludes_everything() {
    let module = closures_module(false).with_attribute("ExcludeFromCodeCoverage");
    let selection = select(&module);
    assert!(selection.module_exclusion.is_some());
    assert!(selection.points.is_empty());
    assert!(selection.plans.is_empty());
}

#[test]
fn test_file_glob_applies_per_point() {
    let body = Body::new(vec![
        Instruction::at(OpCode::op("call", 0, 0), SourceSpan::line("obj/Generated/Gen.cs", 1)),
        call(2),
        ret(3),
    ]);
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Program").with_member(Member::method("F", body)));
    let config = ExclusionConfig::default().exclude_file("**/Generated/*.cs");
    let selection = select_with(&module, &config);
    assert_eq!(selection.point_count(), 2);
    assert!(selection.points.iter().all(|p| p.span.file == FILE));
    assert_eq!(selection.points[0].id, PointId::new(0));
}

#[test]
fn test_auto_properties_optional() {
    let getter = Member::method("get_Name", straight(1))
        .with_kind(MemberKind::Getter)
        .auto_property();
    let module = Module::new("App").with_type(TypeDef::new("App.Person").with_member(getter));
    assert_eq!(select(&module).methods.len(), 1);
    let config = ExclusionConfig::default().skip_auto_properties(true);
    assert!(select_with(&module, &config).methods.is_empty());
}

#[test]
fn test_unsafe_members_are_skipped_and_module_continues() {
    let broken = Body {
        instructions: vec![Instruction::at(OpCode::Jump { target: 7 }, at(1))],
        ..Body::default()
    };
    let probed = Body::new(vec![Instruction::probe(PointId::new(0)), ret(3)]);
    let module = Module::new("App").with_type(
        TypeDef::new("App.Program")
            .with_member(Member::method("Broken", broken))
            .with_member(Member::method("Probed", probed))
            .with_member(Member::method("Fine", straight(9))),
    );
    let selection = select(&module);
    assert_eq!(selection.skipped.len(), 2);
    assert!(selection.skipped[0]
        .reason
        .starts_with("Unsupported construct in App::App.Program::Broken"));
    assert!(selection.skipped[0].reason.contains("targets 7"));
    assert!(selection.skipped[1].reason.contains("probes"));
    assert_eq!(selection.methods.len(), 1);
    assert_eq!(selection.points[0].id, PointId::new(0));
}

#[test]
fn test_forced_skip() {
    let module = Module::new("App").with_type(
        TypeDef::new("App.Program")
            .with_member(Member::method("A", straight(1)))
            .with_member(Member::method("B", straight(5))),
    );
    let mut forced = BTreeMap::new();
    forced.insert(MemberRef::new(0, 0), "verifier rejected rewrite".to_string());
    let selection = PointSelector::new(&ExclusionConfig::default())
        .unwrap()
        .select_with(&module, &forced);
    assert_eq!(selection.skipped[0].member, "App.Program::A");
    assert_eq!(selection.methods.len(), 1);
    assert_eq!(selection.points[0].span.start_line, 5);
    assert_eq!(selection.points[0].id, PointId::new(0));
}

#[test]
fn test_bodyless_members_are_ignored() {
    let mut abstract_member = Member::method("Abstract", straight(1));
    abstract_member.body = None;
    let module = Module::new("App")
        .with_type(TypeDef::new("App.Base").with_member(abstract_member));
    let selection = select(&module);
    assert!(selection.points.is_empty());
    assert!(selection.skipped.is_empty());
}

#[test]
fn test_selection_is_deterministic() {
    let module = closures_module(false);
    assert_eq!(select(&module), select(&module));
    let map = select(&module).into_map();
    assert!(map.is_consistent());
    assert_eq!(map.points.len(), 10);
}
