// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Dry-run probe for development.

use rand::Rng;

use crate::checks::CheckError;

/// Fails roughly one call in ten.
pub(crate) fn check() -> Result<(), CheckError> {
    if rand::rng().random_range(0..10) == 0 {
        return Err(CheckError::DryRun);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_about_ten_percent() {
        let failures = (0..10_000).filter(|_| check().is_err()).count();
        // Loose bounds; this is a sanity check, not a statistics exam.
        assert!((500..2000).contains(&failures), "failures: {failures}");
    }
}
