//! System-id classification and the `zkillRelatedUrl` scheme.
//!
//! See `DESIGN.md` for the reasoning behind the chosen classification bands
//! and URL scheme.

use chrono::{DateTime, Utc};

use crate::types::{SecurityType, SpaceType};

/// Wormhole systems occupy the `31000000..=31999999` band. Pochven is a
/// small, fixed set of system ids assigned after the 2021 Triglavian
/// invasion; everything else in the `30000000..=39999999` k-space band is
/// ordinary known space.
const WORMHOLE_RANGE: std::ops::RangeInclusive<i64> = 31_000_000..=31_999_999;

const POCHVEN_SYSTEM_IDS: &[i64] = &[
    30002057, 30002058, 30002059, 30002060, 30002061, 30002062, 30002063, 30002064, 30002065,
    30002066, 30002067, 30002068, 30002069, 30002070, 30002071, 30002072, 30002073,
];

pub fn space_type_for_system(system_id: i64) -> SpaceType {
    if POCHVEN_SYSTEM_IDS.contains(&system_id) {
        SpaceType::Pochven
    } else if WORMHOLE_RANGE.contains(&system_id) {
        SpaceType::Jspace
    } else {
        SpaceType::Kspace
    }
}

/// Projects `SecurityType` from `SpaceType` plus an optional security status
/// in `[-1.0, 1.0]` (as published by the EVE static data export). Highsec is
/// `>= 0.5`, lowsec is `> 0.0`, nullsec is `<= 0.0`. When the status is
/// unknown for a k-space system, defaults to `nullsec` (the conservative
/// choice for ruleset filtering — tracked-security-type allowlists should
/// not silently admit battles of unknown security).
pub fn security_type_for(space_type: SpaceType, security_status: Option<f64>) -> SecurityType {
    match space_type {
        SpaceType::Jspace => SecurityType::Wormhole,
        SpaceType::Pochven => SecurityType::Pochven,
        SpaceType::Kspace => match security_status {
            Some(status) if status >= 0.5 => SecurityType::Highsec,
            Some(status) if status > 0.0 => SecurityType::Lowsec,
            _ => SecurityType::Nullsec,
        },
    }
}

/// `https://zkillboard.com/related/{systemId}/{startTime as YYYYMMDDHH00}/`
///
/// zkillboard's own "related kills" view buckets by system and hour; this
/// mirrors that convention so the generated link actually resolves to the
/// right neighbourhood of kills.
pub fn zkill_related_url(system_id: i64, start_time: DateTime<Utc>) -> String {
    format!(
        "https://zkillboard.com/related/{}/{}00/",
        system_id,
        start_time.format("%Y%m%d%H")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classifies_kspace() {
        assert_eq!(space_type_for_system(30000142), SpaceType::Kspace);
    }

    #[test]
    fn classifies_wormhole() {
        assert_eq!(space_type_for_system(31000005), SpaceType::Jspace);
    }

    #[test]
    fn classifies_pochven() {
        assert_eq!(space_type_for_system(30002057), SpaceType::Pochven);
    }

    #[test]
    fn security_defaults_to_nullsec_when_unknown() {
        assert_eq!(
            security_type_for(SpaceType::Kspace, None),
            SecurityType::Nullsec
        );
    }

    #[test]
    fn security_highsec_boundary() {
        assert_eq!(
            security_type_for(SpaceType::Kspace, Some(0.5)),
            SecurityType::Highsec
        );
        assert_eq!(
            security_type_for(SpaceType::Kspace, Some(0.45)),
            SecurityType::Lowsec
        );
    }

    #[test]
    fn zkill_url_buckets_by_hour() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 0).unwrap();
        assert_eq!(
            zkill_related_url(30000142, t),
            "https://zkillboard.com/related/30000142/202405011200/"
        );
    }
}
