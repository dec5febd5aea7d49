//! Pure inventory-stacking arithmetic.
//!
//! Planning is separated from persistence so the rules can be tested
//! without a database: handlers compute a plan here, then apply it through
//! the gateway and mirror it onto the wire.

use world_db::ContainerItemRow;

use crate::INVENTORY_SLOTS;

/// How to place `inserted` units of an item into an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    /// Existing slots to top up: (container item id, new amount).
    pub fills: Vec<(i64, u32)>,
    /// Amounts for freshly created stacks.
    pub new_stacks: Vec<u32>,
    pub inserted: u32,
    /// Units that did not fit.
    pub leftover: u32,
}

/// Plan inserting `amount` of `item_id` (stacking up to `max_stack`).
///
/// Existing under-capacity stacks of the same item fill first, in slot
/// order; remaining units open new slots while fewer than
/// [`INVENTORY_SLOTS`] exist.
pub fn plan_insert(
    stacks: &[ContainerItemRow],
    item_id: i64,
    max_stack: u32,
    amount: u32,
) -> InsertPlan {
    let mut remaining = amount;
    let mut fills = Vec::new();

    for stack in stacks.iter().filter(|s| s.item_id == item_id) {
        if remaining == 0 {
            break;
        }
        if stack.amount < max_stack {
            let take = remaining.min(max_stack - stack.amount);
            fills.push((stack.id, stack.amount + take));
            remaining -= take;
        }
    }

    let mut new_stacks = Vec::new();
    let mut slots_used = stacks.len();
    while remaining > 0 && slots_used < INVENTORY_SLOTS {
        let take = remaining.min(max_stack);
        new_stacks.push(take);
        remaining -= take;
        slots_used += 1;
    }

    InsertPlan {
        fills,
        new_stacks,
        inserted: amount - remaining,
        leftover: remaining,
    }
}

/// A single correction produced by [`plan_rebalance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceStep {
    SetAmount { slot_id: i64, amount: u32 },
    Delete { slot_id: i64 },
}

/// Coalesce same-item stacks so at most one under-capacity stack per item
/// type remains. Earlier slots fill first; emptied slots are deleted.
pub fn plan_rebalance(stacks: &[ContainerItemRow]) -> Vec<RebalanceStep> {
    let mut steps = Vec::new();
    let mut seen_items: Vec<i64> = Vec::new();

    for stack in stacks {
        if seen_items.contains(&stack.item_id) {
            continue;
        }
        seen_items.push(stack.item_id);

        let group: Vec<&ContainerItemRow> =
            stacks.iter().filter(|s| s.item_id == stack.item_id).collect();
        if group.len() < 2 {
            continue;
        }

        let max = stack.max_stack_amt.max(1);
        let mut total: u64 = group.iter().map(|s| s.amount as u64).sum();
        for slot in &group {
            let take = (total).min(max as u64) as u32;
            total -= take as u64;
            if take == 0 {
                steps.push(RebalanceStep::Delete { slot_id: slot.id });
            } else if take != slot.amount {
                steps.push(RebalanceStep::SetAmount {
                    slot_id: slot.id,
                    amount: take,
                });
            }
        }
    }
    steps
}

/// Whether at least one more unit of anything stackable could be accepted.
pub fn has_capacity(stacks: &[ContainerItemRow]) -> bool {
    stacks.len() < INVENTORY_SLOTS || stacks.iter().any(|s| s.amount < s.max_stack_amt)
}
