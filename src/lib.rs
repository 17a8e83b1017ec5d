// Copyright 2025 Daniel Crenna & Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # testkitchen
//!
//! A convention-based unit-test engine, paired with a static analyzer that estimates how well
//! a test container's compiled CIL handles the exceptions it throws.
//!
//! ## Features
//!
//! - **Convention discovery** - test containers and test methods are found by name and shape,
//!   through three independently replaceable filters
//! - **Scoped services** - a run-wide scope built once, plus a fresh per-test scope for every
//!   invocation, with test-to-run fallback
//! - **Duty cycles** - a test can ask to be repeated or skipped at runtime; every repetition
//!   is recorded on its own
//! - **Trace capture** - diagnostic output written during an invocation is attached to that
//!   invocation's result only
//! - **Exception coverage** - method bodies are decoded (ECMA-335 tiny and fat headers,
//!   exception-handling sections) and the analyzer compares thrown types against handled ones
//!
//! ## Quick Start
//!
//! ```rust
//! use testkitchen::prelude::*;
//!
//! #[derive(Default)]
//! struct CalculatorTests;
//!
//! let assembly = TestAssembly::new("Demo", "bin/Demo.dll").with_type(
//!     TestType::builder::<CalculatorTests>("Demo.CalculatorTests")
//!         .default_constructor(CalculatorTests::default)
//!         .test("Adds_two_numbers", |_| Ok(2 + 2 == 4))
//!         .test_with_context("Repeats", |_, context| {
//!             context.repeat(2);
//!             Ok(true)
//!         })
//!         .build(),
//! );
//!
//! let catalog = TestCatalog::new(StaticLoader::new().with_assembly(assembly));
//! let handle = CollectingHandle::new();
//! ExecutionEngine::run_sources(EngineConfig::default(), &catalog, ["bin/Demo.dll"], &handle)?;
//!
//! // One result for the first test, three for the repeated one, one coverage verdict
//! assert_eq!(handle.results().len(), 5);
//! # Ok::<(), testkitchen::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] and [`metadata`] - raw method body access, tokens, resolved type references
//! - [`assembly`] - CIL instruction decoding into a typed [`assembly::InstructionStream`]
//! - [`analysis`] - the [`analysis::ExceptionFlowAnalyzer`]
//! - [`discovery`] - the reflection model, conventions and the [`discovery::TestCatalog`]
//! - [`fixture`], [`context`] and [`trace`] - what a running test sees
//! - [`engine`] - the [`engine::ExecutionEngine`] and its reporting interfaces
//!
//! ## Error Handling
//!
//! Fallible library operations return [`Result<T, Error>`](Result). Test bodies return
//! `anyhow::Result<bool>`; an `Err` or a panic fails that one invocation and the run goes on.
//!
//! ```rust
//! use testkitchen::{Error, metadata::method::MethodBody};
//!
//! match MethodBody::from(&[0x07]) {
//!     Ok(_) => println!("Parsed"),
//!     Err(Error::Malformed { message, .. }) => println!("Malformed body: {}", message),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Bounds-checked reads over raw method bodies.
pub mod file;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use testkitchen::prelude::*;
///
/// let case = TestCase::standard("Demo.MathTests", "Adds", "Demo.dll");
/// assert_eq!(case.display_name, "Adds");
/// ```
pub mod prelude;

/// Metadata tokens, resolved type references and method body headers based on ECMA-335.
pub mod metadata;

/// CIL instruction decoding.
///
/// - [`assembly::decode_instruction`] - decode a single instruction
/// - [`assembly::decode_stream`] - decode a run of instructions
/// - [`assembly::InstructionStream`] - a decoded method: instructions plus handler regions
pub mod assembly;

/// Exception-flow analysis over decoded method bodies.
pub mod analysis;

/// Test discovery: the reflection model, conventions, catalog and name lookup.
pub mod discovery;

pub mod fixture;

pub mod context;

pub mod trace;

/// Test execution and reporting.
pub mod engine;

/// `testkitchen` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `testkitchen` Error type
///
/// Covers body decoding failures as well as test resolution, construction and scope errors.
pub use error::Error;

/// Cursor over raw bytes, used by the instruction decoder.
///
/// # Example
///
/// ```rust
/// use testkitchen::{Parser, assembly::decode_instruction};
///
/// let code = [0x2A]; // ret
/// let mut parser = Parser::new(&code);
/// let instr = decode_instruction(&mut parser, None)?;
/// assert_eq!(instr.opcode, 0x2A);
/// # Ok::<(), testkitchen::Error>(())
/// ```
pub use file::parser::Parser;
