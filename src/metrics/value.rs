// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::device::fields::{FP64_BLANK_SENTINELS, INT_BLANK_SENTINELS, STR_BLANK_SENTINELS};
use crate::device::types::{FieldValue, SampleValue};

/// Marker for a value that is legitimately absent (blank, not found, not
/// supported or not permissioned). Samples carrying it are dropped.
pub const SKIP_DCGM_VALUE: &str = "SKIPPING DCGM VALUE";

/// Marker for a sample whose type cannot be rendered as a metric value.
pub const FAILED_TO_CONVERT: &str = "ERROR - FAILED TO CONVERT TO STRING";

/// Render a raw sample as its canonical string form.
pub fn to_string(value: &FieldValue) -> String {
    match &value.value {
        SampleValue::Int64(v) => {
            if INT_BLANK_SENTINELS.contains(v) {
                SKIP_DCGM_VALUE.to_string()
            } else {
                v.to_string()
            }
        }
        SampleValue::Double(v) => {
            if FP64_BLANK_SENTINELS.contains(v) {
                SKIP_DCGM_VALUE.to_string()
            } else {
                format!("{v:.6}")
            }
        }
        SampleValue::String(s) => {
            if STR_BLANK_SENTINELS.contains(&s.as_str()) {
                SKIP_DCGM_VALUE.to_string()
            } else {
                s.clone()
            }
        }
        SampleValue::Timestamp(_) | SampleValue::Binary(_) => FAILED_TO_CONVERT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fields::*;

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(SKIP_DCGM_VALUE, FAILED_TO_CONVERT);
    }

    #[test]
    fn test_int_sentinels_are_skipped() {
        for v in INT_BLANK_SENTINELS {
            assert_eq!(to_string(&FieldValue::int64(1, v)), SKIP_DCGM_VALUE, "{v}");
        }
        assert_eq!(to_string(&FieldValue::int64(1, 1410)), "1410");
        assert_eq!(to_string(&FieldValue::int64(1, -3)), "-3");
    }

    #[test]
    fn test_double_sentinels_are_skipped() {
        for v in FP64_BLANK_SENTINELS {
            assert_eq!(to_string(&FieldValue::double(1, v)), SKIP_DCGM_VALUE, "{v}");
        }
        assert_eq!(to_string(&FieldValue::double(1, 143.5)), "143.500000");
        assert_eq!(to_string(&FieldValue::double(1, 0.0)), "0.000000");
    }

    #[test]
    fn test_string_sentinels_are_skipped() {
        for v in STR_BLANK_SENTINELS {
            assert_eq!(to_string(&FieldValue::string(1, v)), SKIP_DCGM_VALUE, "{v}");
        }
        assert_eq!(
            to_string(&FieldValue::string(DCGM_FI_DRIVER_VERSION, "550.54.15")),
            "550.54.15"
        );
    }

    #[test]
    fn test_unrenderable_kinds_fail_to_convert() {
        let binary = FieldValue {
            field_id: 1,
            value: SampleValue::Binary(vec![0xde, 0xad]),
        };
        let ts = FieldValue {
            field_id: 1,
            value: SampleValue::Timestamp(1_700_000_000),
        };
        assert_eq!(to_string(&binary), FAILED_TO_CONVERT);
        assert_eq!(to_string(&ts), FAILED_TO_CONVERT);
    }
}
