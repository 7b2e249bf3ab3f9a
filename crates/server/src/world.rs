//! World state management.
//!
//! The entity store: players (humans and NPCs) in one namespace, enemies in
//! a second. Both maps are ordered so every scan visits entities in a
//! stable order (humans, then NPCs, then enemies by tier).

use crate::entity::{Enemy, Mobile, Player};
use crate::movement;
use glam::Vec2;
use protocol::{EntityId, EntityView, Tier};
use rand::Rng;
use std::collections::BTreeMap;

/// World border bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBorder {
    /// Side of the square arena.
    pub canvas_size: f32,
    /// Side of an avatar.
    pub entity_size: f32,
}

impl WorldBorder {
    pub fn new(canvas_size: f32, entity_size: f32) -> Self {
        Self {
            canvas_size,
            entity_size,
        }
    }

    /// Largest coordinate an avatar's top-left corner may take.
    #[inline]
    pub fn max(&self) -> f32 {
        (self.canvas_size - self.entity_size).max(0.0)
    }

    #[inline]
    pub fn clamp(&self, position: Vec2) -> Vec2 {
        position.clamp(Vec2::ZERO, Vec2::splat(self.max()))
    }

    #[inline]
    pub fn contains(&self, position: Vec2) -> bool {
        let max = self.max();
        (0.0..=max).contains(&position.x) && (0.0..=max).contains(&position.y)
    }

    /// Random whole-pixel position within the border.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let span = self.max().floor() as u32;
        Vec2::new(
            rng.random_range(0..span.max(1)) as f32,
            rng.random_range(0..span.max(1)) as f32,
        )
    }
}

/// The shared arena.
#[derive(Debug)]
pub struct World {
    pub border: WorldBorder,
    players: BTreeMap<EntityId, Player>,
    enemies: BTreeMap<EntityId, Enemy>,
}

impl World {
    /// Create an empty world.
    pub fn new(border: WorldBorder) -> Self {
        Self {
            border,
            players: BTreeMap::new(),
            enemies: BTreeMap::new(),
        }
    }

    /// Insert or replace a player.
    pub fn upsert_player(&mut self, id: EntityId, player: Player) -> Option<Player> {
        debug_assert!(!id.is_enemy(), "enemy id {id} in the player namespace");
        self.players.insert(id, player)
    }

    pub fn remove_player(&mut self, id: EntityId) -> Option<Player> {
        self.players.remove(&id)
    }

    #[inline]
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(&id)
    }

    #[inline]
    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    #[inline]
    pub fn players(&self) -> impl Iterator<Item = (&EntityId, &Player)> {
        self.players.iter()
    }

    #[inline]
    pub fn players_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut Player)> {
        self.players.iter_mut()
    }

    /// Insert or replace an enemy.
    pub fn upsert_enemy(&mut self, id: EntityId, enemy: Enemy) -> Option<Enemy> {
        debug_assert!(id.is_enemy(), "player id {id} in the enemy namespace");
        self.enemies.insert(id, enemy)
    }

    #[inline]
    pub fn enemy(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    #[inline]
    pub fn enemy_mut(&mut self, id: EntityId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    #[inline]
    pub fn enemies(&self) -> impl Iterator<Item = (&EntityId, &Enemy)> {
        self.enemies.iter()
    }

    #[inline]
    pub fn enemies_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut Enemy)> {
        self.enemies.iter_mut()
    }

    /// Remove every enemy, returning how many there were.
    pub fn clear_enemies(&mut self) -> usize {
        let count = self.enemies.len();
        self.enemies.clear();
        count
    }

    /// Visit every mobile entity: players first, then enemies.
    pub fn for_each(&self, mut f: impl FnMut(EntityId, &dyn Mobile)) {
        for (&id, player) in &self.players {
            f(id, player);
        }
        for (&id, enemy) in &self.enemies {
            f(id, enemy);
        }
    }

    /// Get any mobile entity by id.
    pub fn get(&self, id: EntityId) -> Option<&dyn Mobile> {
        if id.is_enemy() {
            self.enemies.get(&id).map(|e| e as &dyn Mobile)
        } else {
            self.players.get(&id).map(|p| p as &dyn Mobile)
        }
    }

    /// Reset every player to the default tier, returning the ids that changed.
    pub fn reset_tiers(&mut self) -> Vec<EntityId> {
        self.players
            .iter_mut()
            .filter(|(_, player)| !player.tier().is_default())
            .map(|(&id, player)| {
                player.body_mut().tier = Tier::Default;
                id
            })
            .collect()
    }

    /// Whether any player or enemy sits strictly below `tier`.
    pub fn any_below(&self, tier: Tier) -> bool {
        self.players.values().any(|p| p.tier() < tier)
            || self.enemies.values().any(|e| e.tier() < tier)
    }

    /// Humans still at the default tier.
    pub fn uninfected_humans(&self) -> Vec<EntityId> {
        self.players
            .iter()
            .filter(|(_, p)| p.is_human() && p.tier().is_default())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Spawn `count` NPCs (`npc_0` .. `npc_{count-1}`) at random positions.
    pub fn spawn_npcs<R: Rng + ?Sized>(
        &mut self,
        count: u32,
        min_steps: i32,
        max_steps: i32,
        rng: &mut R,
    ) {
        for index in 0..count {
            let position = self.border.random_position(rng);
            let (direction, steps) = movement::roll_wander(rng, min_steps, max_steps);
            self.upsert_player(EntityId::Npc(index), Player::npc(position, direction, steps));
        }
    }

    /// Client views of all players.
    pub fn player_views(&self) -> BTreeMap<EntityId, EntityView> {
        self.players
            .iter()
            .map(|(&id, p)| (id, p.body().view()))
            .collect()
    }

    /// Client views of all enemies.
    pub fn enemy_views(&self) -> BTreeMap<EntityId, EntityView> {
        self.enemies
            .iter()
            .map(|(&id, e)| (id, e.body().view()))
            .collect()
    }

    /// Get the count of each entity kind.
    #[inline]
    pub fn counts(&self) -> EntityCounts {
        let humans = self.players.values().filter(|p| p.is_human()).count();
        EntityCounts {
            humans,
            npcs: self.players.len() - humans,
            enemies: self.enemies.len(),
        }
    }
}

/// Entity count statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub humans: usize,
    pub npcs: usize,
    pub enemies: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    fn world() -> World {
        World::new(WorldBorder::new(600.0, 32.0))
    }

    #[test]
    fn border_max_accounts_for_entity_size() {
        let border = WorldBorder::new(600.0, 32.0);
        assert_eq!(border.max(), 568.0);
        assert_eq!(border.clamp(Vec2::new(-1.0, 1000.0)), Vec2::new(0.0, 568.0));
        assert!(border.contains(Vec2::new(568.0, 0.0)));
        assert!(!border.contains(Vec2::new(568.5, 0.0)));
    }

    #[test]
    fn random_positions_stay_in_bounds() {
        let border = WorldBorder::new(600.0, 32.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            assert!(border.contains(border.random_position(&mut rng)));
        }
    }

    #[test]
    fn upsert_get_remove() {
        let mut world = world();
        let id = EntityId::Human(1);
        assert!(world.upsert_player(id, Player::human(addr(), Vec2::new(5.0, 5.0))).is_none());
        assert_eq!(world.get(id).map(|m| m.position()), Some(Vec2::new(5.0, 5.0)));
        assert!(world.remove_player(id).is_some());
        assert!(world.get(id).is_none());
        assert!(world.remove_player(id).is_none());
    }

    #[test]
    fn for_each_visits_players_then_enemies() {
        let mut world = world();
        world.upsert_enemy(EntityId::enemy(Tier::One), Enemy::new(Tier::One, Vec2::ZERO));
        world.upsert_player(EntityId::Npc(0), Player::npc(Vec2::ZERO, Vec2::ZERO, 1));
        world.upsert_player(EntityId::Human(3), Player::human(addr(), Vec2::ZERO));

        let mut seen = Vec::new();
        world.for_each(|id, _| seen.push(id));
        assert_eq!(
            seen,
            vec![EntityId::Human(3), EntityId::Npc(0), EntityId::Enemy(1)]
        );
    }

    #[test]
    fn reset_tiers_reports_changed_players_only() {
        let mut world = world();
        world.upsert_player(EntityId::Human(1), Player::human(addr(), Vec2::ZERO));
        world.upsert_player(EntityId::Npc(0), Player::npc(Vec2::ZERO, Vec2::ZERO, 1));
        world.player_mut(EntityId::Npc(0)).unwrap().body_mut().tier = Tier::Two;

        assert_eq!(world.reset_tiers(), vec![EntityId::Npc(0)]);
        assert!(world.players().all(|(_, p)| p.tier().is_default()));
        assert!(world.reset_tiers().is_empty());
    }

    #[test]
    fn uninfected_humans_exclude_npcs() {
        let mut world = world();
        world.upsert_player(EntityId::Human(1), Player::human(addr(), Vec2::ZERO));
        world.upsert_player(EntityId::Human(2), Player::human(addr(), Vec2::ZERO));
        world.upsert_player(EntityId::Npc(0), Player::npc(Vec2::ZERO, Vec2::ZERO, 1));
        world.player_mut(EntityId::Human(2)).unwrap().body_mut().tier = Tier::One;

        assert_eq!(world.uninfected_humans(), vec![EntityId::Human(1)]);
    }

    #[test]
    fn spawn_npcs_uses_reserved_ids() {
        let mut world = world();
        let mut rng = StdRng::seed_from_u64(9);
        world.spawn_npcs(4, 10, 30, &mut rng);
        let counts = world.counts();
        assert_eq!(counts, EntityCounts { humans: 0, npcs: 4, enemies: 0 });
        for (id, npc) in world.players() {
            assert!(id.is_npc());
            assert!((10..=30).contains(&npc.body().steps_remaining));
            assert!(world.border.contains(npc.position()));
        }
    }

    #[test]
    fn any_below_includes_enemies() {
        let mut world = world();
        world.upsert_player(EntityId::Npc(0), Player::npc(Vec2::ZERO, Vec2::ZERO, 1));
        world.player_mut(EntityId::Npc(0)).unwrap().body_mut().tier = Tier::Two;
        world.upsert_enemy(EntityId::enemy(Tier::One), Enemy::new(Tier::One, Vec2::ZERO));
        assert!(world.any_below(Tier::Two));
        world.enemy_mut(EntityId::Enemy(1)).unwrap().body_mut().tier = Tier::Two;
        assert!(!world.any_below(Tier::Two));
    }
}
