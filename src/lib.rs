pub mod errors;

pub mod config {
    pub mod policy;
}

pub mod filtering {
    pub mod evaluator;
    pub mod filter_map;
}

pub mod specs {
    pub mod report_spec;
    pub mod trigger_spec;
}

pub mod privacy {
    pub mod combinatorics;
    pub mod randomized_response;
}

pub mod events {
    pub mod source;
    pub mod trigger;
}

pub mod reports {
    pub mod builder;
    pub mod event_report;
    pub mod noise;
    pub mod report_windows;
    pub mod traits;
}

pub mod storage {
    pub mod hashmap_store;
    pub mod traits;
}

pub mod attribution {
    pub mod engine;
}

pub mod util {
    pub mod mocks;
}
