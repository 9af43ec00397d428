// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

use std::fs::File;
use std::io::BufReader;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use sextant::analytics::{self, Counts, Summary};

use crate::args::StatsArgs;

pub fn stats(args: StatsArgs) {
    let file = match File::open(&args.analytics_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to open {}: {}",
                args.analytics_file.display(),
                e
            );
            process::exit(1);
        }
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    print!("{}", format_summary(&analytics::summarize(BufReader::new(file), now)));
}

fn format_summary(summary: &Summary) -> String {
    let row = |period: &str, counts: &Counts| {
        format!(
            "{:<8}{:>10}{:>10}{:>10}\n",
            period, counts.request, counts.error, counts.notfound
        )
    };
    let mut table = format!("{:<8}{:>10}{:>10}{:>10}\n", "", "request", "error", "notfound");
    table.push_str(&row("day", &summary.day));
    table.push_str(&row("week", &summary.week));
    table.push_str(&row("month", &summary.month));
    table
}
