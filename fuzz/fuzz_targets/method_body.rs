#![no_main]

use libfuzzer_sys::fuzz_target;
use testkitchen::{
    analysis::{AnalyzerConfig, ExceptionFlowAnalyzer},
    metadata::typeref::TokenTable,
};

fuzz_target!(|data: &[u8]| {
    let tokens = TokenTable::new();
    let _ = ExceptionFlowAnalyzer::new(AnalyzerConfig::precise()).analyze_bodies([Some(data)], &tokens);
});
