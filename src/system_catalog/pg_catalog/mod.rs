// pg_catalog tables served from the aggregate registry.

pub mod pg_aggregate;
pub mod pg_proc;

pub fn register_defaults() {
    pg_proc::register();
    pg_aggregate::register();
}
