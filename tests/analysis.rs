//! Exception-flow analysis integration tests.
//!
//! These tests hand-assemble ECMA-335 method bodies, run them through the public decoding and
//! analysis API, and check the coverage verdict both directly and as reported by the engine
//! for a container's synthetic coverage case.

use testkitchen::{
    analysis::{AnalyzerConfig, ExceptionFlowAnalyzer},
    assembly::InstructionStream,
    engine::{CollectingHandle, EngineConfig, ExecutionEngine, MessageCategory, TestOutcome},
    metadata::{
        token::Token,
        typeref::{MemberRef, TokenTable, TypeRef},
    },
    prelude::{StaticLoader, TestAssembly, TestCatalog, TestType},
    Result,
};

const ARGUMENT_TYPE: u32 = 0x0100_0002;
const ARGUMENT_CTOR: u32 = 0x0A00_0001;
const INVALID_CTOR: u32 = 0x0A00_0003;
const UNKNOWN_TYPE: u32 = 0x0100_0099;

/// One small-format exception clause: try range, handler range and class token.
struct Clause {
    try_offset: u16,
    try_length: u8,
    handler_offset: u16,
    handler_length: u8,
    class_token: u32,
}

/// Assemble a fat method body, with a small exception section when `clauses` is non-empty.
fn fat_body(code: &[u8], clauses: &[Clause]) -> Vec<u8> {
    let mut body = Vec::new();
    // Fat format, init locals, header size of three dwords; more sections when guarded
    let flags: u16 = if clauses.is_empty() { 0x3013 } else { 0x301B };
    body.extend_from_slice(&flags.to_le_bytes());
    body.extend_from_slice(&2u16.to_le_bytes());
    body.extend_from_slice(&(code.len() as u32).to_le_bytes());
    body.extend_from_slice(&0x1100_0001u32.to_le_bytes());
    body.extend_from_slice(code);

    if clauses.is_empty() {
        return body;
    }

    while body.len() % 4 != 0 {
        body.push(0);
    }
    body.push(0x01);
    body.push((4 + 12 * clauses.len()) as u8);
    body.extend_from_slice(&[0x00, 0x00]);
    for clause in clauses {
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&clause.try_offset.to_le_bytes());
        body.push(clause.try_length);
        body.extend_from_slice(&clause.handler_offset.to_le_bytes());
        body.push(clause.handler_length);
        body.extend_from_slice(&clause.class_token.to_le_bytes());
    }
    body
}

/// Tiny body: `newobj <ctor>; throw`.
fn tiny_throw(ctor: u32) -> Vec<u8> {
    let mut body = vec![(6 << 2) | 0x02, 0x73];
    body.extend_from_slice(&ctor.to_le_bytes());
    body.push(0x7A);
    body
}

/// `try { throw new ArgumentException(); } catch (<class_token>) { }`
fn guarded_throw(class_token: u32) -> Vec<u8> {
    #[rustfmt::skip]
    let code = [
        0x73, 0x01, 0x00, 0x00, 0x0A,   // newobj ArgumentException::.ctor
        0x7A,                           // throw
        0x26,                           // pop
        0x17,                           // ldc.i4.1
        0x0A,                           // stloc.0
        0xDE, 0x00,                     // leave.s
        0x06,                           // ldloc.0
        0x2A,                           // ret
    ];
    fat_body(
        &code,
        &[Clause {
            try_offset: 0,
            try_length: 6,
            handler_offset: 6,
            handler_length: 5,
            class_token,
        }],
    )
}

fn argument_exception() -> TypeRef {
    TypeRef::new("System.ArgumentException")
        .with_base("System.SystemException")
        .with_base("System.Exception")
}

fn invalid_operation() -> TypeRef {
    TypeRef::new("System.InvalidOperationException")
        .with_base("System.SystemException")
        .with_base("System.Exception")
}

fn tokens() -> TokenTable {
    TokenTable::new()
        .with_type(Token::new(ARGUMENT_TYPE), argument_exception())
        .with_member(
            Token::new(ARGUMENT_CTOR),
            MemberRef::constructor(argument_exception()),
        )
        .with_member(
            Token::new(INVALID_CTOR),
            MemberRef::constructor(invalid_operation()),
        )
}

#[test]
fn thrown_type_caught_by_its_own_clause() -> Result<()> {
    let stream = InstructionStream::decode(&guarded_throw(ARGUMENT_TYPE), &tokens())?;
    let analyzer = ExceptionFlowAnalyzer::default();
    let result = analyzer.analyze(&stream);

    assert_eq!(result.thrown(), &[argument_exception()]);
    assert_eq!(result.handled(), &[argument_exception()]);
    assert!(result.unhandled().is_empty());
    assert_eq!(result.try_block_count(), 1);
    assert!(analyzer.verdict(&result).is_passed());
    Ok(())
}

#[test]
fn unattributable_throw_still_counts_its_region() -> Result<()> {
    #[rustfmt::skip]
    let code = [
        0x03,                           // ldarg.1
        0x7A,                           // throw
        0x26,                           // pop
        0xDE, 0x00,                     // leave.s
        0x2A,                           // ret
    ];
    let body = fat_body(
        &code,
        &[Clause {
            try_offset: 0,
            try_length: 2,
            handler_offset: 2,
            handler_length: 3,
            class_token: UNKNOWN_TYPE,
        }],
    );

    let stream = InstructionStream::decode(&body, &tokens())?;
    let result = ExceptionFlowAnalyzer::default().analyze(&stream);

    assert!(result.thrown().is_empty());
    assert!(result.handled().is_empty());
    assert_eq!(result.try_block_count(), 1);
    Ok(())
}

#[test]
fn first_thrown_type_wins_per_declaring_type() {
    let first = tiny_throw(ARGUMENT_CTOR);
    let second = tiny_throw(INVALID_CTOR);
    let bodies = || [Some(first.as_slice()), Some(second.as_slice())];

    let folded = ExceptionFlowAnalyzer::default().analyze_bodies(bodies(), &tokens());
    assert_eq!(folded.thrown().len(), 1);
    assert!(folded.handled().is_empty());

    let precise = ExceptionFlowAnalyzer::new(AnalyzerConfig::precise());
    let everything = precise.analyze_bodies(bodies(), &tokens());
    assert_eq!(everything.thrown().len(), 2);
    assert!(!precise.verdict(&everything).is_passed());
}

#[test]
fn missing_and_broken_bodies_contribute_nothing() {
    let truncated = [0x1B, 0x30];
    let result = ExceptionFlowAnalyzer::default()
        .analyze_bodies([None, Some(&truncated[..])], &tokens());

    assert!(result.is_empty());
    assert!(ExceptionFlowAnalyzer::default().verdict(&result).is_passed());
}

#[test]
fn coverage_cases_report_through_the_engine() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    struct Parsing;
    struct Guarded;

    let assembly = TestAssembly::new("Demo", "bin/Demo.dll")
        .with_resolver(tokens())
        .with_type(
            TestType::builder::<Parsing>("Demo.ParserTests")
                .default_constructor(|| Parsing)
                .test("Parses", |_| Ok(true))
                .il("Parse", tiny_throw(ARGUMENT_CTOR))
                .build(),
        )
        .with_type(
            TestType::builder::<Guarded>("Demo.GuardedTests")
                .default_constructor(|| Guarded)
                .test("Recovers", |_| Ok(true))
                .il("Recover", guarded_throw(ARGUMENT_TYPE))
                .build(),
        );

    let catalog = TestCatalog::new(StaticLoader::new().with_assembly(assembly));
    let handle = CollectingHandle::new();
    ExecutionEngine::run_sources(EngineConfig::default(), &catalog, ["bin/Demo.dll"], &handle)?;

    let results = handle.results();
    let coverage = |type_name: &str| {
        results
            .iter()
            .find(|r| r.case.is_virtual() && r.case.declaring_type == type_name)
            .cloned()
            .expect("coverage result")
    };

    let parser = coverage("Demo.ParserTests");
    assert_eq!(parser.outcome, TestOutcome::Failed);
    assert_eq!(
        parser.error_message.as_deref(),
        Some("System.ArgumentException potentially thrown but not handled")
    );
    assert_eq!(
        parser.message(MessageCategory::Failed),
        parser.error_message.as_deref()
    );
    assert_eq!(parser.case.display_name, "Demo.ParserTests unhandled exceptions");

    let guarded = coverage("Demo.GuardedTests");
    assert_eq!(guarded.outcome, TestOutcome::Passed);
    assert!(guarded.error_message.is_none());

    // Two standard tests plus two coverage cases
    assert_eq!(results.len(), 4);
    Ok(())
}
