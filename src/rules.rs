//! Classification and consolidation rules generated from `rules/parasol-rules.yaml`.

include!(concat!(env!("OUT_DIR"), "/parasol_rules.rs"));
