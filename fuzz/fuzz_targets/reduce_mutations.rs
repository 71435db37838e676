#![no_main]

use libfuzzer_sys::fuzz_target;
use tote_core::reducer::apply;
use tote_core::{
    CartSnapshot, CurrencyCode, IssuedAt, LineDraft, MerchandiseId, Money, MutationRequest,
    ProductDisplay,
};

const IDS: [&str; 4] = ["a", "b", "c", "d"];

fn draft(usd: &CurrencyCode, id: &str, cents: u8) -> LineDraft {
    LineDraft {
        unit_cost: Money::from_minor(i64::from(cents) * 25, usd.clone()),
        product: ProductDisplay {
            handle: id.to_string(),
            title: id.to_uppercase(),
            variant_title: "Default Title".to_string(),
            image: None,
            selected_options: Vec::new(),
        },
    }
}

// Each pair of bytes is one mutation: op/target in the first, quantity or
// price in the second.
fuzz_target!(|data: &[u8]| {
    let Ok(usd) = CurrencyCode::new("USD") else {
        return;
    };
    let mut cart = CartSnapshot::empty(&usd);

    for (n, pair) in (1_u64..).zip(data.chunks_exact(2)) {
        let id = IDS[usize::from(pair[0] & 0b11)];
        let merchandise_id = MerchandiseId::new(id);
        let request = match (pair[0] >> 2) % 4 {
            0 => MutationRequest::Add {
                merchandise_id,
                quantity: u32::from(pair[1] % 8),
                draft: Some(draft(&usd, id, pair[1])),
            },
            1 => MutationRequest::Increment { merchandise_id },
            2 => MutationRequest::Decrement { merchandise_id },
            _ => MutationRequest::Remove { merchandise_id },
        };

        let before = cart.clone();
        cart = apply(&before, &request.issue(IssuedAt(n)));

        assert!(cart.lines.iter().all(|line| line.quantity > 0));
        let sum: u32 = cart.lines.iter().map(|line| line.quantity).sum();
        assert_eq!(sum, cart.total_quantity);
        let mut ids: Vec<_> = cart.lines.iter().map(|line| &line.merchandise_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), cart.lines.len());
    }
});
