pub mod credit_indicators_archive;
pub mod lib_sgs;
