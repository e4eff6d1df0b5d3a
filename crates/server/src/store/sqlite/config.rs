// Copyright 2015-2018 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;

use serde::Deserialize;

/// Configuration for sqlite journaled zones
#[derive(Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    /// path to the sqlite journal file
    pub journal_file_path: PathBuf,
    /// zone file rendered after each commit, for the nameserver to reload
    #[serde(default)]
    pub zone_file_path: Option<PathBuf>,
}
