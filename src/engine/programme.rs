//! Race programme generation: class, grade, surface and distance for the
//! next card.

use rand::Rng;

use crate::race::RaceConditions;
use crate::types::{ClassTier, Grade, RaceId, Surface};

const DISTANCE_STEP_M: u32 = 400;

/// Draw class and grade. Maiden 40%, 1-win 20%, 2-win 20%, 3-win 10%,
/// open 10% of which half are G1.
pub fn draw_class<R: Rng + ?Sized>(rng: &mut R) -> (ClassTier, Grade) {
    let r: f64 = rng.gen();
    if r < 0.4 {
        (ClassTier::Maiden, Grade::General)
    } else if r < 0.6 {
        (ClassTier::OneWin, Grade::General)
    } else if r < 0.8 {
        (ClassTier::TwoWin, Grade::General)
    } else if r < 0.9 {
        (ClassTier::ThreeWin, Grade::General)
    } else if rng.gen_bool(0.5) {
        (ClassTier::Open, Grade::G1)
    } else {
        (ClassTier::Open, Grade::General)
    }
}

/// Turf 50%, dirt 40%, steeplechase 10%.
pub fn draw_surface<R: Rng + ?Sized>(rng: &mut R) -> Surface {
    let r: f64 = rng.gen();
    if r < 0.5 {
        Surface::Turf
    } else if r < 0.9 {
        Surface::Dirt
    } else {
        Surface::Steeplechase
    }
}

/// 1200 to 2800 metres in 400 m steps.
pub fn draw_distance<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(3..8) * DISTANCE_STEP_M
}

pub fn race_name(id: RaceId, class: ClassTier, grade: Grade, surface: Surface) -> String {
    let title = match (class, grade) {
        (_, Grade::G1) => "G1 Emperor's Cup".to_string(),
        (_, Grade::G2) => "G2 Stakes".to_string(),
        (_, Grade::G3) => "G3 Stakes".to_string(),
        (ClassTier::Open, _) => "Open Special".to_string(),
        (ClassTier::Debut, _) => "Newcomer Race".to_string(),
        (ClassTier::Maiden, _) => "Maiden Race".to_string(),
        (tier, _) => format!("{tier} Allowance"),
    };
    match surface {
        Surface::Steeplechase => format!("Race {} {} Hurdle", id.0, title),
        _ => format!("Race {} {}", id.0, title),
    }
}

/// Full conditions for a freshly generated race.
pub fn draw_conditions<R: Rng + ?Sized>(id: RaceId, rng: &mut R) -> RaceConditions {
    let (class, grade) = draw_class(rng);
    let surface = draw_surface(rng);
    let distance_m = draw_distance(rng);
    RaceConditions {
        name: race_name(id, class, grade, surface),
        class,
        grade,
        surface,
        distance_m,
    }
}
