use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::base::port::ChannelRef;
use crate::sim::clock::Cycle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRow {
    pub cycle: Cycle,
    pub port: String,
    pub last: bool,
    pub id: u64,
    pub dest: u64,
    pub user: u64,
    /// Data bytes as hex, most significant byte first.
    pub data: String,
}

/// Records every transfer on a set of probed channels. Sample after each edge; ports keep their
/// values until the next drive, so the sample sees exactly what was transferred.
#[derive(Debug, Default)]
pub struct TransferTrace {
    probes: Vec<(String, ChannelRef)>,
    rows: Vec<TraceRow>,
}

impl TransferTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&mut self, port: impl Into<String>, chan: ChannelRef) {
        self.probes.push((port.into(), chan));
    }

    pub fn sample(&mut self, cycle: Cycle) {
        for (port, chan) in &self.probes {
            let wire = chan.snapshot();
            if !wire.fired() {
                continue;
            }
            if let Some(beat) = wire.beat {
                let data = beat
                    .data
                    .iter()
                    .rev()
                    .map(|b| format!("{:02x}", b))
                    .collect::<String>();
                self.rows.push(TraceRow {
                    cycle,
                    port: port.clone(),
                    last: beat.last,
                    id: beat.id,
                    dest: beat.dest,
                    user: beat.user,
                    data,
                });
            }
        }
    }

    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> std::io::Result<()> {
        let mut writer = BufWriter::new(writer);
        writeln!(writer, "cycle,port,last,id,dest,user,data")?;
        for row in &self.rows {
            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                row.cycle, row.port, row.last as u8, row.id, row.dest, row.user, row.data
            )?;
        }
        writer.flush()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        self.write_csv(File::create(path)?)
    }
}
