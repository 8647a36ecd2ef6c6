pub const RECORDS_POLLED: &str = "kacao_records_polled";
pub const RECORDS_KEPT: &str = "kacao_records_kept";
pub const RECORDS_EMITTED: &str = "kacao_records_emitted";
pub const FETCH_ERRORS: &str = "kacao_fetch_errors";
pub const FETCH_LOOP_EXITS: &str = "kacao_fetch_loop_exits";
pub const RECORDS_PRODUCED: &str = "kacao_records_produced";
