//! Terrain contact: particles dropped onto the height field stay above it
//! and rebound according to the coefficient of restitution.

use std::sync::Arc;

use tailings_kernel::{
    HeightField, ParticleDomain, SimulationBounds, SimulationKernel, SolverParams, TailingsSolver,
    TerrainSampler,
};

const FRAMES: usize = 150;

fn drop_params(restitution: f32) -> SolverParams {
    SolverParams {
        coefficient_of_restitution: restitution,
        viscosity: 0.0,
        friction: 0.0,
        sub_step: 1.0e-3,
        substeps: 10,
        ..SolverParams::default()
    }
}

fn bounds() -> SimulationBounds {
    SimulationBounds::from_min_size([0.0, -2.0, 0.0], [40.0, 10.0, 40.0]).unwrap()
}

/// Drop one particle from 2 units above flat ground; returns the lowest
/// height reached and the largest upward speed after first contact.
fn drop_particle(restitution: f32) -> (f32, f32) {
    let domain = ParticleDomain {
        fluid: vec![[20.0, 2.0, 20.0]],
        walls: Vec::new(),
        bounds: bounds(),
        particle_mass: 1.0,
        effective_radius: 1.2,
    };
    let terrain = Arc::new(HeightField::flat(8, 0.0).unwrap());
    let mut solver = TailingsSolver::new(drop_params(restitution), domain, terrain).unwrap();

    let mut lowest = f32::MAX;
    let mut rebound = 0.0_f32;
    for _ in 0..FRAMES {
        solver.step_frame();
        let p = solver.particles()[0];
        lowest = lowest.min(p.position[1]);
        if lowest < 0.05 {
            rebound = rebound.max(p.velocity[1]);
        }
    }
    (lowest, rebound)
}

#[test]
fn particle_never_sinks_into_terrain() {
    for e in [0.07, 0.5, 0.9] {
        let (lowest, _) = drop_particle(e);
        assert!(lowest > -0.1, "e={e}: reached {lowest}");
    }
}

#[test]
fn higher_restitution_bounces_higher() {
    let (_, soft) = drop_particle(0.07);
    let (_, bouncy) = drop_particle(0.9);
    assert!(bouncy > 1.0, "bouncy rebound speed {bouncy}");
    assert!(soft < 0.5 * bouncy, "soft={soft}, bouncy={bouncy}");
}

#[test]
fn particle_slides_downhill() {
    // Elevation rises along +x
    let res = 8;
    let raw: Vec<f32> = (0..res * res).map(|i| (i % res) as f32 / (res - 1) as f32).collect();
    let terrain = Arc::new(HeightField::from_grid(res, res, raw, 0.0, 10.0).unwrap());
    let start_x = 20.0;
    let ground = terrain.elevation(0.5, 0.5);
    let domain = ParticleDomain {
        fluid: vec![[start_x, ground + 0.01, 20.0]],
        walls: Vec::new(),
        bounds: SimulationBounds::from_min_size([0.0, -2.0, 0.0], [40.0, 20.0, 40.0]).unwrap(),
        particle_mass: 1.0,
        effective_radius: 1.2,
    };
    let mut params = drop_params(0.07);
    params.friction = 0.001;
    let mut solver = TailingsSolver::new(params, domain, terrain.clone()).unwrap();
    for _ in 0..100 {
        solver.step_frame();
    }
    let p = solver.particles()[0];
    assert!(p.position[0] < start_x, "particle should move toward lower ground: x={}", p.position[0]);
    assert!(p.travelled > 0.0);
}

#[test]
fn particles_stay_inside_planar_bounds() {
    let domain = ParticleDomain {
        fluid: vec![[39.9, 1.0, 0.1]],
        walls: Vec::new(),
        bounds: bounds(),
        particle_mass: 1.0,
        effective_radius: 1.2,
    };
    let terrain = Arc::new(HeightField::flat(8, 0.0).unwrap());
    let mut params = drop_params(0.5);
    params.gravity = [50.0, -9.81, -50.0];
    let mut solver = TailingsSolver::new(params, domain, terrain).unwrap();
    for _ in 0..20 {
        solver.step_frame();
    }
    let p = solver.particles()[0];
    assert!(p.position[0] <= 40.0 && p.position[2] >= 0.0, "{:?}", p.position);
}
