//! Running test cases.
//!
//! A run happens in two phases. Planning resolves every case through the [`MethodTable`] and
//! constructs its container; constructors may still register services at that point.
//! Execution then builds the run scope and invokes each planned case in order, opening a
//! fresh test scope per invocation.
//!
//! ```text
//! NotStarted -> Instantiating -> Invoking -> (Skipped | Passed | Failed) -> Recorded
//! ```
//!
//! Cases that cannot be resolved or constructed are dropped during planning with a
//! diagnostic and never produce a result. Virtual exception-coverage cases skip
//! construction entirely and are judged by the analyzer.

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
};

use crate::{
    analysis::ExceptionFlowAnalyzer,
    context::TestContext,
    discovery::{
        file_name, split_qualified_name, MethodHandle, MethodTable, TestCatalog, TestInstance,
        TestType, TypeEntry, Visited,
    },
    engine::{
        EngineConfig, FrameworkHandle, HandleSink, MessageCategory, MessageSink, TestCase,
        TestOutcome, TestResult, VIRTUAL_TESTS,
    },
    fixture::TestFixture,
    trace, Error, Result,
};

/// Attached to results whose body faulted instead of returning.
pub const FAULT_MESSAGE: &str = "Test failed because an exception prevented execution.";

const NO_CONSTRUCTOR: &str = "Could not find a suitable constructor for the test containing class";

struct StandardPlan {
    case: TestCase,
    handle: MethodHandle,
    instance: TestInstance,
}

struct VirtualPlan {
    case: TestCase,
    entry: TypeEntry,
}

enum Planned {
    Standard(StandardPlan),
    Virtual(VirtualPlan),
}

impl Planned {
    fn case(&self) -> &TestCase {
        match self {
            Planned::Standard(plan) => &plan.case,
            Planned::Virtual(plan) => &plan.case,
        }
    }
}

struct Fault {
    message: String,
    stack: Option<String>,
}

impl Fault {
    fn from_error(error: &anyhow::Error) -> Self {
        Fault {
            message: error.to_string(),
            stack: Some(format!("{error:?}")),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "test body panicked".to_string());
        Fault {
            message,
            stack: None,
        }
    }
}

/// Runs test cases against a [`MethodTable`] and reports to a [`FrameworkHandle`].
///
/// # Examples
///
/// ```rust
/// use testkitchen::prelude::*;
///
/// #[derive(Default)]
/// struct MathTests;
///
/// let assembly = TestAssembly::new("Demo", "Demo.dll").with_type(
///     TestType::builder::<MathTests>("Demo.MathTests")
///         .default_constructor(MathTests::default)
///         .test("Adds", |_| Ok(1 + 1 == 2))
///         .build(),
/// );
///
/// let engine = ExecutionEngine::new(EngineConfig::default(), MethodTable::new().with_assembly(&assembly));
/// let handle = CollectingHandle::new();
/// engine.run([TestCase::standard("Demo.MathTests", "Adds", "Demo.dll")], &handle)?;
///
/// assert_eq!(handle.results()[0].outcome, TestOutcome::Passed);
/// # Ok::<(), testkitchen::Error>(())
/// ```
#[derive(Debug)]
pub struct ExecutionEngine {
    config: EngineConfig,
    table: MethodTable,
    analyzer: ExceptionFlowAnalyzer,
}

impl ExecutionEngine {
    /// Create an engine resolving names through `table`.
    #[must_use]
    pub fn new(config: EngineConfig, table: MethodTable) -> Self {
        let analyzer = ExceptionFlowAnalyzer::new(config.analyzer.clone());
        ExecutionEngine {
            config,
            table,
            analyzer,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Discover everything in `sources` through `catalog`, standard and virtual cases alike,
    /// and run it.
    ///
    /// A test or coverage case reached through more than one source runs once.
    ///
    /// # Errors
    /// Only if the run scope cannot be built.
    pub fn run_sources<'s>(
        config: EngineConfig,
        catalog: &TestCatalog,
        sources: impl IntoIterator<Item = &'s str>,
        handle: &dyn FrameworkHandle,
    ) -> Result<()> {
        let sink = HandleSink::new(handle, false);
        let mut table = MethodTable::new();
        let mut visited = Visited::new();
        let mut cases = Vec::new();

        for source in sources {
            handle.info(&format!("Running all tests in {}", file_name(source)));
            let Some(assembly) = catalog.load_source(source, &sink) else {
                continue;
            };

            table.add_assembly(&assembly);
            cases.extend(
                catalog
                    .discover_assembly(&assembly, &mut visited, &sink)
                    .into_iter()
                    .map(|test| test.case),
            );
            cases.extend(catalog.virtual_cases(&assembly, &mut visited));
        }

        ExecutionEngine::new(config, table).run(cases, handle)
    }

    /// Run `cases` in order.
    ///
    /// Individual cases never abort the run: unresolvable or unconstructible cases are
    /// reported as diagnostics, and faulting bodies become failed results.
    ///
    /// With trace capture enabled the run holds the process-wide [`trace`] session until it
    /// returns, so runs on different threads execute one after another. A run started from
    /// inside a test body on the same thread nests: its trace output goes to its own results,
    /// and the enclosing invocation keeps what it wrote before and after.
    ///
    /// # Errors
    /// Only if the run scope cannot be built.
    pub fn run(&self, cases: impl IntoIterator<Item = TestCase>, handle: &dyn FrameworkHandle) -> Result<()> {
        let _session = self.config.capture_trace.then(trace::attach);

        let fixture = TestFixture::new();
        let mut plan = self.plan(cases, &fixture, handle);
        log::debug!("Planned {} test case(s)", plan.len());

        fixture.begin()?;

        let sink = HandleSink::new(handle, self.config.mirror_messages_to_trace);
        for planned in &mut plan {
            handle.info(&format!(
                "Evaluating test at path {}",
                file_name(&planned.case().source)
            ));

            match planned {
                Planned::Standard(standard) => {
                    self.execute_standard(standard, &fixture, handle, &sink);
                }
                Planned::Virtual(coverage) => self.execute_virtual(coverage, handle),
            }
        }

        fixture.end();
        Ok(())
    }

    fn plan(
        &self,
        cases: impl IntoIterator<Item = TestCase>,
        fixture: &TestFixture,
        handle: &dyn FrameworkHandle,
    ) -> Vec<Planned> {
        let mut plan = Vec::new();

        for case in cases {
            if case.is_virtual() {
                if let Some(coverage) = self.plan_virtual(case, handle) {
                    plan.push(Planned::Virtual(coverage));
                }
                continue;
            }

            let name = case.fully_qualified_name.as_str();
            handle.info(&format!("Test name = {name}"));

            let (type_name, method_name) = match split_qualified_name(name) {
                Ok(parts) => parts,
                Err(error) => {
                    handle.warning(&error.to_string());
                    continue;
                }
            };
            handle.info(&format!("Type name = {type_name}"));
            handle.info(&format!("Method name = {method_name}"));

            let resolved = match self.table.resolve(name) {
                Ok(resolved) => resolved,
                Err(error) => {
                    handle.warning(&error.to_string());
                    continue;
                }
            };

            let Some(instance) = Self::instantiate(&resolved.ty, fixture, handle) else {
                continue;
            };

            plan.push(Planned::Standard(StandardPlan {
                case,
                handle: resolved.handle,
                instance,
            }));
        }

        plan
    }

    fn plan_virtual(&self, case: TestCase, handle: &dyn FrameworkHandle) -> Option<VirtualPlan> {
        let type_name = split_qualified_name(&case.fully_qualified_name)
            .ok()
            .and_then(|(owner, _)| owner.strip_prefix(VIRTUAL_TESTS))
            .and_then(|owner| owner.strip_prefix('.'))
            .filter(|owner| !owner.is_empty())
            .unwrap_or(&case.declaring_type)
            .to_string();

        match self.table.find_type(&type_name) {
            Some(entry) => Some(VirtualPlan {
                entry: entry.clone(),
                case,
            }),
            None => {
                handle.warning(&Error::TypeNotFound(type_name).to_string());
                None
            }
        }
    }

    fn instantiate(ty: &TestType, fixture: &TestFixture, handle: &dyn FrameworkHandle) -> Option<TestInstance> {
        handle.info(&format!("Creating instance for type {}", ty.full_name));

        let Some(constructor) = ty.preferred_constructor() else {
            handle.error(&Error::NoSuitableConstructor(ty.full_name.clone()).to_string());
            return None;
        };
        handle.info(&constructor.kind().signature(ty.name()));

        let failure = match catch_unwind(AssertUnwindSafe(|| constructor.construct(fixture))) {
            Ok(Ok(instance)) => return Some(instance),
            Ok(Err(error)) => format!("{error:#}"),
            Err(payload) => Fault::from_panic(payload.as_ref()).message,
        };

        handle.error(
            &Error::Construction {
                type_name: ty.full_name.clone(),
                message: failure,
            }
            .to_string(),
        );
        handle.error(NO_CONSTRUCTOR);
        None
    }

    fn execute_standard(
        &self,
        plan: &mut StandardPlan,
        fixture: &TestFixture,
        handle: &dyn FrameworkHandle,
        sink: &dyn MessageSink,
    ) {
        handle.info("Running standard test");

        let context = TestContext::new(fixture, sink, self.config.random_seed);
        let mut occurrence = 1;
        handle.record_result(self.duty_cycle(plan, occurrence, &context, fixture, handle));

        // Only the first invocation may ask for repetitions
        let mut remaining = context.take_repeat();
        while !context.is_skipped() && remaining > 0 {
            occurrence += 1;
            handle.record_result(self.duty_cycle(plan, occurrence, &context, fixture, handle));
            context.take_repeat();
            remaining -= 1;
        }
    }

    fn duty_cycle(
        &self,
        plan: &mut StandardPlan,
        occurrence: u32,
        context: &TestContext<'_>,
        fixture: &TestFixture,
        handle: &dyn FrameworkHandle,
    ) -> TestResult {
        let case = plan.case.with_occurrence(occurrence);
        context.reset_invocation();

        handle.info("Starting test");
        handle.record_start(&case);

        let invoked = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<bool> {
            fixture.begin_test()?;
            plan.handle.invoke(plan.instance.as_mut(), context)
        }));
        fixture.end_test();

        let verdict = match invoked {
            Ok(Ok(passed)) => Ok(passed),
            Ok(Err(error)) => Err(Fault::from_error(&error)),
            Err(payload) => Err(Fault::from_panic(payload.as_ref())),
        };

        match verdict {
            Ok(passed) => {
                let outcome = if context.is_skipped() {
                    TestOutcome::Skipped
                } else {
                    TestOutcome::from_verdict(passed)
                };
                handle.info(&format!("{} => {outcome}", case.display_name));
                handle.info("Ending test");
                handle.record_end(&case, outcome);

                let mut result = TestResult::new(case, outcome);
                if outcome == TestOutcome::Skipped {
                    result.add_message(MessageCategory::Skipped, context.skip_reason());
                }
                self.attach_output(&mut result);
                result
            }
            Err(fault) => {
                handle.error(&fault.message);
                handle.record_end(&case, TestOutcome::Failed);

                let mut result = TestResult::new(case, TestOutcome::Failed);
                result.add_message(MessageCategory::Failed, FAULT_MESSAGE);
                result.error_message = Some(fault.message);
                result.error_stack_trace = fault.stack;
                self.attach_output(&mut result);
                result
            }
        }
    }

    fn execute_virtual(&self, plan: &VirtualPlan, handle: &dyn FrameworkHandle) {
        let case = plan.case.clone();
        handle.info("Running exception coverage test");
        handle.info("Starting test");
        handle.record_start(&case);

        let ty = &plan.entry.ty;
        let analysis = self.analyzer.analyze_bodies(
            ty.methods.iter().map(|method| method.body.as_deref()),
            plan.entry.resolver.as_ref(),
        );
        log::debug!(
            "{}: {} thrown, {} handled, {} try block(s)",
            ty.full_name,
            analysis.thrown().len(),
            analysis.handled().len(),
            analysis.try_block_count()
        );

        let verdict = self.analyzer.verdict(&analysis);
        let outcome = TestOutcome::from_verdict(verdict.is_passed());
        handle.info(&format!("{} => {outcome}", case.display_name));
        handle.info("Ending test");
        handle.record_end(&case, outcome);

        let mut result = TestResult::new(case, outcome);
        if let Some(message) = verdict.message() {
            result.add_message(MessageCategory::Failed, message.clone());
            result.error_message = Some(message);
        }
        self.attach_output(&mut result);
        handle.record_result(result);
    }

    fn attach_output(&self, result: &mut TestResult) {
        if !self.config.capture_trace {
            return;
        }
        if let Some(output) = trace::drain() {
            result.add_message(MessageCategory::StdOut, output);
        }
    }
}
