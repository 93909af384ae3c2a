use super::constants::{MINIMAP_GRID_SIZE, WORLD_RADIUS};
use super::snake::Snake;

/// Coarse occupancy grid over the world square, indexed `[x][y]`.
pub fn occupancy_grid<'a>(snakes: impl IntoIterator<Item = &'a Snake>) -> Vec<Vec<bool>> {
    let size = MINIMAP_GRID_SIZE;
    let mut grid = vec![vec![false; size]; size];
    for snake in snakes {
        for segment in &snake.segments {
            let nx = (segment.x + WORLD_RADIUS) / (2.0 * WORLD_RADIUS);
            let ny = (segment.y + WORLD_RADIUS) / (2.0 * WORLD_RADIUS);
            let gx = (nx * size as f64).floor();
            let gy = (ny * size as f64).floor();
            if gx >= 0.0 && gy >= 0.0 && gx < size as f64 && gy < size as f64 {
                grid[gx as usize][gy as usize] = true;
            }
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::math::Vec2;
    use crate::game::snake::SnakeInit;

    #[test]
    fn marks_cells_under_segments_only() {
        let snake = Snake::spawn(
            SnakeInit {
                id: "m".to_string(),
                username: "m".to_string(),
                color: 0,
                position: Vec2::ZERO,
                angle: 0.0,
                length: 5.0,
                cash: 0.0,
                is_spectator: false,
            },
            &mut rand::thread_rng(),
        );
        let grid = occupancy_grid([&snake]);
        let center = MINIMAP_GRID_SIZE / 2;
        assert!(grid[center][center]);
        let marked = grid.iter().flatten().filter(|cell| **cell).count();
        assert_eq!(marked, 1);
    }

    #[test]
    fn out_of_world_segments_are_skipped() {
        let mut snake = Snake::spawn(
            SnakeInit {
                id: "m".to_string(),
                username: "m".to_string(),
                color: 0,
                position: Vec2::new(5000.0, 0.0),
                angle: 0.0,
                length: 5.0,
                cash: 0.0,
                is_spectator: false,
            },
            &mut rand::thread_rng(),
        );
        snake.segments.truncate(5);
        assert!(occupancy_grid([&snake]).iter().flatten().all(|cell| !cell));
    }
}
