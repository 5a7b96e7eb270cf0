use crate::simulation_engine::vehicles::Maneuver;

// Rows and columns: Straight, Left, Right, UTurn.
const TABLE: [[bool; 4]; 4] = [
    [false, false, true, true],
    [false, false, true, false],
    [true, true, true, true],
    [true, false, true, false],
];

fn index(maneuver: Maneuver) -> usize {
    match maneuver.base() {
        Maneuver::Left => 1,
        Maneuver::Right => 2,
        Maneuver::UTurn => 3,
        _ => 0,
    }
}

/// Whether two movements through one crossing may be green together.
/// Pass the movement actually made at the crossing (`Vehicle::crossing_maneuver`).
pub fn compatible(a: Maneuver, b: Maneuver) -> bool {
    TABLE[index(a)][index(b)]
}
