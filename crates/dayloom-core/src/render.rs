use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::capacity::{CapacitySource, CapacityUsage};
use crate::config::Config;
use crate::grid::Cell;
use crate::layout::TimeBlock;
use crate::task::Occurrence;
use crate::views::{DayEffort, DayView};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, weeks))]
    pub fn print_month(&mut self, weeks: &[Vec<Cell>]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = weeks
            .iter()
            .map(|week| week.iter().map(|cell| self.cell_summary(cell)).collect())
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_week(&mut self, cells: &[Cell]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for cell in cells {
            let heading = cell.date.format("%a %Y-%m-%d").to_string();
            let heading = if cell.is_today {
                self.paint(&heading, "1;36")
            } else {
                heading
            };
            writeln!(out, "{heading}")?;

            for occurrence in &cell.carried_over {
                writeln!(out, "  ..{} {}", time_range(occurrence), occurrence.title)?;
            }
            for occurrence in &cell.occurrences {
                writeln!(out, "  {} {}", self.check(occurrence), self.occurrence_line(occurrence))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, view), fields(date = %view.date))]
    pub fn print_day(&mut self, view: &DayView) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", view.date.format("%A %Y-%m-%d"))?;
        writeln!(out)?;

        self.write_blocks(&mut out, &view.blocks)?;
        writeln!(out)?;

        writeln!(
            out,
            "done      {}/{}",
            view.summary.completed, view.summary.total
        )?;
        writeln!(out, "capacity  {}", self.capacity_line(&view.capacity))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_effort(&mut self, rows: &[DayEffort]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "Date".to_string(),
            "Used".to_string(),
            "Capacity".to_string(),
            "Done".to_string(),
        ];

        let rows = rows
            .iter()
            .map(|row| {
                let used = format_minutes(row.capacity.used_minutes);
                let used = if row.capacity.is_over_capacity {
                    self.paint(&used, "31")
                } else {
                    used
                };
                vec![
                    row.date.format("%a %Y-%m-%d").to_string(),
                    used,
                    capacity_label(&row.capacity),
                    format!("{}/{}", row.summary.completed, row.summary.total),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, occurrences))]
    pub fn print_occurrences(&mut self, occurrences: &[Occurrence]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "Date".to_string(),
            "Time".to_string(),
            "Id".to_string(),
            "Title".to_string(),
        ];
        let rows = occurrences
            .iter()
            .map(|occ| {
                vec![
                    occ.due_date.format("%Y-%m-%d").to_string(),
                    time_range(occ),
                    self.paint(&occ.id, "33"),
                    occ.title.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_config(&mut self, cfg: &Config) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let mut entries: Vec<_> = cfg.iter().collect();
        entries.sort();
        for (key, value) in entries {
            writeln!(out, "{key} = {value}")?;
        }
        for file in &cfg.loaded_files {
            writeln!(out, "# loaded {}", file.display())?;
        }
        Ok(())
    }

    fn write_blocks<W: Write>(&self, out: &mut W, blocks: &[TimeBlock]) -> anyhow::Result<()> {
        let headers = vec![
            "Time".to_string(),
            "Top".to_string(),
            "Height".to_string(),
            "Block".to_string(),
            "Flags".to_string(),
        ];
        let rows = blocks
            .iter()
            .map(|block| {
                let time = if block.is_all_day {
                    "all day".to_string()
                } else {
                    format!(
                        "{}-{}",
                        format_clock(block.start_minute),
                        format_clock(block.end_minute)
                    )
                };
                let label = if block.is_overlap {
                    self.paint(&block.label, "31")
                } else {
                    block.label.clone()
                };
                vec![
                    time,
                    format!("{:.0}", block.top_px),
                    format!("{:.0}", block.height_px),
                    label,
                    block_flags(block),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    fn cell_summary(&self, cell: &Cell) -> String {
        let day = cell.date.format("%d").to_string();
        let day = if cell.is_today {
            self.paint(&day, "1;36")
        } else if !cell.in_period {
            self.paint(&day, "2")
        } else {
            day
        };
        let count = cell.occurrences.len();
        if count == 0 {
            day
        } else {
            format!("{day} ({count})")
        }
    }

    fn occurrence_line(&self, occurrence: &Occurrence) -> String {
        let line = format!("{} {}", time_range(occurrence), occurrence.title);
        if occurrence.no_task {
            self.paint(&line, "2")
        } else {
            line
        }
    }

    fn check(&self, occurrence: &Occurrence) -> String {
        if occurrence.no_task {
            " ".to_string()
        } else if occurrence.completed {
            self.paint("x", "32")
        } else {
            "-".to_string()
        }
    }

    fn capacity_line(&self, usage: &CapacityUsage) -> String {
        let used = format_minutes(usage.used_minutes);
        match usage.source {
            CapacitySource::Unknown | CapacitySource::Unset => {
                format!("{used} booked (set a capacity to see usage)")
            }
            _ if usage.is_over_capacity => self.paint(
                &format!("{used} / {} (over)", format_minutes(usage.capacity_minutes)),
                "31",
            ),
            _ => format!(
                "{used} / {} ({} left)",
                format_minutes(usage.capacity_minutes),
                format_minutes(usage.remaining_minutes)
            ),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn capacity_label(usage: &CapacityUsage) -> String {
    if usage.has_capacity() {
        format_minutes(usage.capacity_minutes)
    } else {
        "-".to_string()
    }
}

fn block_flags(block: &TimeBlock) -> String {
    let mut flags = Vec::new();
    if block.is_cross_day {
        flags.push("cross-day");
    }
    if block.is_no_task {
        flags.push("no-task");
    }
    if block.is_overlap {
        flags.push("overlap");
    }
    flags.join(",")
}

fn time_range(occurrence: &Occurrence) -> String {
    match (
        occurrence.start_time.as_deref(),
        occurrence.end_time.as_deref(),
        occurrence.due_time.as_deref(),
    ) {
        (Some(start), Some(end), _) => format!("{start}-{end}"),
        (_, _, Some(due)) => format!("@{due}"),
        (Some(start), None, None) => start.to_string(),
        (None, Some(end), None) => format!("-{end}"),
        (None, None, None) => "all day".to_string(),
    }
}

fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn format_minutes(minutes: u32) -> String {
    format!("{}h{:02}m", minutes / 60, minutes % 60)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
