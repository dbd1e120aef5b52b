pub mod probe_cache;
pub mod prober;
