use super::constants::PAYOUT_FRACTION;
use super::snake::Snake;
use super::types::EntityId;
use std::collections::HashMap;

/// Where a forfeited stake went.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settlement {
    pub victim_cash: f64,
    pub killer_reward: f64,
    pub killer_id: Option<EntityId>,
    pub nearest_reward: f64,
    pub nearest_id: Option<EntityId>,
}

impl Settlement {
    pub fn payout(&self) -> f64 {
        self.killer_reward + self.nearest_reward
    }

    pub fn recipient(&self) -> Option<&str> {
        self.killer_id.as_deref().or(self.nearest_id.as_deref())
    }
}

/// Closest live, non-spectator head to `victim`, excluding the victim.
pub fn nearest_survivor<'a>(
    victim: &Snake,
    live: impl IntoIterator<Item = &'a Snake>,
) -> Option<EntityId> {
    let origin = victim.head_position();
    live.into_iter()
        .filter(|snake| snake.id != victim.id && !snake.is_spectator)
        .map(|snake| (snake.head_position().distance_squared(origin), snake))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, snake)| snake.id.clone())
}

/// Forfeits the victim's stake. `snakes` is the live set and must still hold
/// the victim. `PAYOUT_FRACTION` of the stake goes to the killer when it is
/// live, otherwise to the nearest survivor; the rest leaves circulation.
pub fn settle_death(
    snakes: &mut HashMap<EntityId, Snake>,
    victim_id: &str,
    killer_id: Option<&str>,
) -> Settlement {
    let Some(victim) = snakes.get(victim_id) else {
        return Settlement::default();
    };
    let victim_cash = victim.cash.max(0.0);
    let reward = victim_cash * PAYOUT_FRACTION;

    let killer = killer_id
        .filter(|id| *id != victim_id)
        .filter(|id| snakes.get(*id).is_some_and(|snake| !snake.is_spectator))
        .map(str::to_string);

    let mut settlement = Settlement {
        victim_cash,
        ..Settlement::default()
    };

    match killer {
        Some(id) => {
            if let Some(snake) = snakes.get_mut(&id) {
                snake.cash += reward;
                snake.kills += 1;
            }
            settlement.killer_reward = reward;
            settlement.killer_id = Some(id);
        }
        None => {
            let nearest = nearest_survivor(victim, snakes.values());
            if let Some(id) = nearest {
                if let Some(snake) = snakes.get_mut(&id) {
                    snake.cash += reward;
                }
                settlement.nearest_reward = reward;
                settlement.nearest_id = Some(id);
            }
        }
    }

    if let Some(victim) = snakes.get_mut(victim_id) {
        victim.cash = 0.0;
    }
    settlement
}
