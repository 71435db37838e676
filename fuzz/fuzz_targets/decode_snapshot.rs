#![no_main]

use libfuzzer_sys::fuzz_target;
use tote_core::CartSnapshot;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = serde_json::from_slice::<CartSnapshot>(data) else {
        return;
    };

    if snapshot.validate_authoritative().is_ok() {
        assert!(snapshot.lines.iter().all(|line| line.quantity > 0));
        let sum = snapshot
            .lines
            .iter()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity));
        assert_eq!(sum, snapshot.total_quantity);
    }
    let _ = snapshot.display_lines();
    let _ = snapshot.badge_label();
});
