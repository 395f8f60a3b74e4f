//! Record builders shared by unit tests.

use serde_json::{json, Map, Value};
use teslog_protocol::Mode;

use crate::record::Record;

/// A record at `ts` carrying just enough fields to classify as `mode`.
pub fn record(ts: i64, mode: Mode) -> Record {
    record_with(ts, mode, json!({}))
}

/// Like [`record`], with `extra` flat fields layered on top.
pub fn record_with(ts: i64, mode: Mode, extra: Value) -> Record {
    let mut fields = Map::new();
    fields.insert("timets".to_string(), json!(ts));
    fields.insert("state".to_string(), json!("online"));
    match mode {
        Mode::Charging => {
            fields.insert("charger_power".to_string(), json!(7.0));
            fields.insert("charge_time_to_full".to_string(), json!(2.0));
        }
        Mode::Driving => {
            fields.insert("shift_state".to_string(), json!("D"));
        }
        Mode::Conditioning => {
            fields.insert("preconditioning".to_string(), json!(true));
        }
        Mode::Standby => {
            fields.insert("charger_power".to_string(), json!(0.0));
        }
        Mode::Polling => {}
    }
    if let Value::Object(extra) = extra {
        fields.extend(extra);
    }
    let record = Record::from_fields(fields).expect("test record");
    assert_eq!(record.mode, mode, "test record classified unexpectedly");
    record
}
