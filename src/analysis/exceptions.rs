//! Thrown / handled exception accounting over decoded method bodies.

use std::fmt;

use crate::{
    analysis::{AnalyzerConfig, FoldMode},
    assembly::{Instruction, InstructionKind, InstructionStream},
    metadata::typeref::{TokenResolver, TypeRef},
};

/// Exception types a scope may throw and structurally handles.
///
/// Both sets keep insertion order, which is scan order: methods in the order they were
/// supplied, instructions and regions in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionFlowResult {
    thrown: Vec<TypeRef>,
    handled: Vec<TypeRef>,
    try_block_count: usize,
}

impl ExceptionFlowResult {
    /// A result with nothing thrown, nothing handled and no try blocks.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exception types attributed to a `throw` site.
    #[must_use]
    pub fn thrown(&self) -> &[TypeRef] {
        &self.thrown
    }

    /// Exception types named by typed `catch` clauses.
    #[must_use]
    pub fn handled(&self) -> &[TypeRef] {
        &self.handled
    }

    /// Number of exception-handling regions, typed or not.
    #[must_use]
    pub fn try_block_count(&self) -> usize {
        self.try_block_count
    }

    /// Returns true if nothing was found at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.thrown.is_empty() && self.handled.is_empty() && self.try_block_count == 0
    }

    /// Thrown types with no handler of exactly the same type.
    #[must_use]
    pub fn unhandled(&self) -> Vec<&TypeRef> {
        self.thrown
            .iter()
            .filter(|thrown| !self.handled.contains(thrown))
            .collect()
    }

    /// Thrown types with no handler for the type itself or any of its bases.
    #[must_use]
    pub fn unhandled_assignable(&self) -> Vec<&TypeRef> {
        self.thrown
            .iter()
            .filter(|thrown| {
                !self
                    .handled
                    .iter()
                    .any(|handled| thrown.is_assignable_to(handled.full_name()))
            })
            .collect()
    }

    /// Coverage verdict using exact-type suppression.
    #[must_use]
    pub fn verdict(&self) -> CoverageVerdict {
        CoverageVerdict::from_counts(self.handled.len(), self.thrown.len(), self.unhandled())
    }
}

/// Outcome of the exception-coverage check.
///
/// Passes when at least as many types are handled as are thrown. The comparison is on
/// counts, so a failing verdict may list types even when some handled types are unrelated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageVerdict {
    /// Enough handlers exist
    Passed,
    /// Fewer handled than thrown types
    Failed {
        /// Thrown types that no handler suppresses
        unhandled: Vec<TypeRef>,
    },
}

impl CoverageVerdict {
    fn from_counts(handled: usize, thrown: usize, unhandled: Vec<&TypeRef>) -> Self {
        if handled >= thrown {
            CoverageVerdict::Passed
        } else {
            CoverageVerdict::Failed {
                unhandled: unhandled.into_iter().cloned().collect(),
            }
        }
    }

    /// Returns true for [`CoverageVerdict::Passed`].
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, CoverageVerdict::Passed)
    }

    /// Failure message, one line per unhandled type. `None` when passed.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            CoverageVerdict::Passed => None,
            CoverageVerdict::Failed { unhandled } => Some(
                unhandled
                    .iter()
                    .map(|ty| format!("{ty} potentially thrown but not handled"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }
}

impl fmt::Display for CoverageVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            None => f.write_str("passed"),
            Some(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Heuristic exception-flow analysis over [`InstructionStream`]s.
///
/// This is a coverage signal, not a verifier. A `throw` is attributed to a type only when
/// the instruction right before it constructs the exception, or loads a local whose single
/// store is itself right after a construction. Anything else is ignored.
///
/// # Examples
///
/// ```rust
/// use testkitchen::{
///     analysis::ExceptionFlowAnalyzer,
///     assembly::{ExceptionHandlerRegion, InstructionStream},
///     metadata::typeref::TypeRef,
/// };
///
/// let io = TypeRef::new("System.IO.IOException").with_base("System.Exception");
/// let stream = InstructionStream::new(
///     Vec::new(),
///     vec![ExceptionHandlerRegion::catch((0, 4), (4, 8), io.clone())],
/// );
///
/// let result = ExceptionFlowAnalyzer::default().analyze(&stream);
/// assert_eq!(result.handled(), &[io]);
/// assert_eq!(result.try_block_count(), 1);
/// assert!(result.verdict().is_passed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExceptionFlowAnalyzer {
    config: AnalyzerConfig,
}

impl ExceptionFlowAnalyzer {
    /// Creates an analyzer with the given configuration.
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a single method.
    #[must_use]
    pub fn analyze(&self, stream: &InstructionStream) -> ExceptionFlowResult {
        let mut result = ExceptionFlowResult::empty();
        self.accumulate(stream, &mut result);
        result
    }

    /// Analyze every method of one declaring type, folding them into one result.
    pub fn analyze_type<'a, I>(&self, methods: I) -> ExceptionFlowResult
    where
        I: IntoIterator<Item = &'a InstructionStream>,
    {
        let mut result = ExceptionFlowResult::empty();
        for stream in methods {
            self.accumulate(stream, &mut result);
        }
        result
    }

    /// Decode and analyze raw method bodies of one declaring type.
    ///
    /// Missing bodies (abstract or extern methods) and bodies that fail to decode contribute
    /// nothing; this never fails.
    pub fn analyze_bodies<'a, I>(&self, bodies: I, resolver: &dyn TokenResolver) -> ExceptionFlowResult
    where
        I: IntoIterator<Item = Option<&'a [u8]>>,
    {
        let mut result = ExceptionFlowResult::empty();
        for body in bodies.into_iter().flatten() {
            match InstructionStream::decode(body, resolver) {
                Ok(stream) => self.accumulate(&stream, &mut result),
                Err(error) => log::debug!("Skipping undecodable method body: {error}"),
            }
        }
        result
    }

    /// Coverage verdict honoring [`AnalyzerConfig::subtype_aware_unhandled`].
    #[must_use]
    pub fn verdict(&self, result: &ExceptionFlowResult) -> CoverageVerdict {
        let unhandled = if self.config.subtype_aware_unhandled {
            result.unhandled_assignable()
        } else {
            result.unhandled()
        };
        CoverageVerdict::from_counts(result.handled.len(), result.thrown.len(), unhandled)
    }

    fn accumulate(&self, stream: &InstructionStream, result: &mut ExceptionFlowResult) {
        for region in stream.regions() {
            result.try_block_count += 1;

            if let Some(catch_type) = &region.catch_type {
                if catch_type.is_subclass_of(&self.config.root_exception) {
                    self.record(&mut result.handled, catch_type);
                }
            }
        }

        for (index, instr) in stream.instructions().iter().enumerate() {
            if instr.kind != InstructionKind::Throw {
                continue;
            }
            if self.is_saturated(&result.thrown) {
                break;
            }

            if let Some(thrown) = Self::attribute(stream, index) {
                self.record(&mut result.thrown, thrown);
            }
        }
    }

    /// Resolve the exception type thrown by the `throw` at `index`.
    fn attribute(stream: &InstructionStream, index: usize) -> Option<&TypeRef> {
        let producer = stream.previous(index)?;

        match producer.kind {
            InstructionKind::Construct => producer.constructed_type(),
            InstructionKind::LoadLocal(slot) => {
                let instructions = stream.instructions();
                let mut stores = instructions
                    .iter()
                    .enumerate()
                    .filter(|(_, candidate)| candidate.kind == InstructionKind::StoreLocal(slot));

                let (store_index, _) = stores.next()?;
                if stores.next().is_some() {
                    // Reassigned local, the value at the throw is ambiguous
                    return None;
                }

                stream
                    .previous(store_index)
                    .filter(|candidate| candidate.kind == InstructionKind::Construct)
                    .and_then(Instruction::constructed_type)
            }
            _ => None,
        }
    }

    fn is_saturated(&self, set: &[TypeRef]) -> bool {
        self.config.fold == FoldMode::DeclaringType && !set.is_empty()
    }

    fn record(&self, set: &mut Vec<TypeRef>, ty: &TypeRef) {
        if self.is_saturated(set) || set.contains(ty) {
            return;
        }
        set.push(ty.clone());
    }
}
