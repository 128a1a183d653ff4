//! Per-tick data log records.

use crate::actuation::ActuationCommand;
use crate::geometry::distance;

/// One successful control tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataLogRecord {
    /// Seconds since the operation started.
    pub t: f64,
    pub x_init: f64,
    pub y_init: f64,
    pub x_final: f64,
    pub y_final: f64,
    pub distance_moved: f64,
    /// `distance_moved` over the time since the previous record; 0 for the
    /// first record.
    pub velocity: f64,
    pub plus_x_scale: u32,
    pub plus_x_duration_ms: u32,
    pub minus_x_scale: u32,
    pub minus_x_duration_ms: u32,
    pub plus_y_scale: u32,
    pub plus_y_duration_ms: u32,
    pub minus_y_scale: u32,
    pub minus_y_duration_ms: u32,
    pub command_counter: u64,
    pub target_x: f64,
    pub target_y: f64,
}

impl DataLogRecord {
    pub const CSV_HEADER: &'static str = "t_s,x_init,y_init,x_final,y_final,distance_moved,velocity,\
plus_x_scale,plus_x_duration_ms,minus_x_scale,minus_x_duration_ms,\
plus_y_scale,plus_y_duration_ms,minus_y_scale,minus_y_duration_ms,\
command_counter,target_x,target_y";

    pub fn new(
        t: f64,
        initial: [f64; 2],
        final_pos: [f64; 2],
        previous_t: Option<f64>,
        command: &ActuationCommand,
        command_counter: u64,
        target: [f64; 2],
    ) -> Self {
        let moved = distance(initial, final_pos);
        let velocity = match previous_t {
            Some(prev) if t > prev => moved / (t - prev),
            _ => 0.0,
        };
        let f = command.to_fields();
        Self {
            t,
            x_init: initial[0],
            y_init: initial[1],
            x_final: final_pos[0],
            y_final: final_pos[1],
            distance_moved: moved,
            velocity,
            plus_x_scale: f[0],
            plus_x_duration_ms: f[1],
            minus_x_scale: f[2],
            minus_x_duration_ms: f[3],
            plus_y_scale: f[4],
            plus_y_duration_ms: f[5],
            minus_y_scale: f[6],
            minus_y_duration_ms: f[7],
            command_counter,
            target_x: target[0],
            target_y: target[1],
        }
    }

    pub fn command_fields(&self) -> [u32; 8] {
        [
            self.plus_x_scale,
            self.plus_x_duration_ms,
            self.minus_x_scale,
            self.minus_x_duration_ms,
            self.plus_y_scale,
            self.plus_y_duration_ms,
            self.minus_y_scale,
            self.minus_y_duration_ms,
        ]
    }

    pub fn to_csv_row(&self) -> String {
        let fields = self
            .command_fields()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{:.3},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{},{},{:.4},{:.4}",
            self.t,
            self.x_init,
            self.y_init,
            self.x_final,
            self.y_final,
            self.distance_moved,
            self.velocity,
            fields,
            self.command_counter,
            self.target_x,
            self.target_y
        )
    }
}

/// Records of one operation, in tick order.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DataLog {
    records: Vec<DataLogRecord>,
}

impl DataLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; velocity is computed against the previous record.
    pub fn record(
        &mut self,
        t: f64,
        initial: [f64; 2],
        final_pos: [f64; 2],
        command: &ActuationCommand,
        command_counter: u64,
        target: [f64; 2],
    ) -> &DataLogRecord {
        let previous_t = self.records.last().map(|r| r.t);
        let rec = DataLogRecord::new(t, initial, final_pos, previous_t, command, command_counter, target);
        tracing::debug!(
            "tick {}: moved {:.3} at {:.3}/s",
            command_counter,
            rec.distance_moved,
            rec.velocity
        );
        self.records.push(rec);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[DataLogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Header plus one CRLF-terminated row per record.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(DataLogRecord::CSV_HEADER);
        out.push_str("\r\n");
        for r in &self.records {
            out.push_str(&r.to_csv_row());
            out.push_str("\r\n");
        }
        out
    }
}
