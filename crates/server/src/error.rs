/*
 * Copyright (C) 2015 Benjamin Fry <benjaminfry@me.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! All defined errors for the zone update coordinator

mod config_error;
mod persistence_error;
mod update_error;
mod validation_error;

pub use self::config_error::{ConfigError, ConfigErrorKind, ConfigResult};
pub use self::persistence_error::{PersistenceError, PersistenceErrorKind, PersistenceResult};
pub use self::update_error::{UpdateError, UpdateErrorKind, UpdateResult, GENERIC_FAILURE_MESSAGE};
pub use self::validation_error::ValidationError;
