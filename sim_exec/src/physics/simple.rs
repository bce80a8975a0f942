//! # Simple physics world
//!
//! A minimal stand-in for a rigid body engine, used for headless runs and tests.
//!
//! - Free bodies are point masses falling under gravity onto a ground plane at `z = 0`.
//! - Each hinge is one rotational degree of freedom of its child body relative to its parent.
//!   The child's pose is derived from the parent's pose and the hinge angle. Gravity, forces on
//!   the child, added motor torques and the velocity motor act about the hinge axis through an
//!   inertia taken from the child body alone.
//! - Static and fixed bodies never move.
//!
//! Contacts between bodies, and reaction forces from children onto parents, are not modelled.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::{Unit, UnitQuaternion, Vector3};
use util::raise_error;

use super::{BodyDesc, BodyId, BodyState, HingeDesc, JointId, PhysicsBackend, GRAVITY_MS2};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lower bound on hinge inertias so that massless bodies stay integrable.
const MIN_INERTIA: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The simple physics world.
pub struct SimpleWorld {
    bodies: Vec<Option<Body>>,
    hinges: Vec<Option<Hinge>>,
    gravity: bool,
}

struct Body {
    name: String,
    size: Vector3<f64>,
    mass: f64,
    is_static: bool,
    fixed: bool,
    state: BodyState,

    /// Force accumulated for the next step
    force: Vector3<f64>,

    /// Hinge this body hangs from
    parent_hinge: Option<usize>,
}

/// Hinge geometry is stored in the parent's body frame so that hinges can be chained.
struct Hinge {
    body1: usize,
    body2: usize,

    anchor_local: Vector3<f64>,
    axis_local: Unit<Vector3<f64>>,

    /// Child centre relative to the anchor at zero angle
    child_offset_local: Vector3<f64>,

    /// Child orientation relative to the parent at zero angle
    child_rest: UnitQuaternion<f64>,

    angle: f64,
    rate: f64,
    inertia: f64,
    stops: Option<(f64, f64)>,

    motor_velocity: f64,
    motor_fmax: f64,
    motor_torque: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimpleWorld {
    pub fn new(gravity: bool) -> Self {
        Self {
            bodies: Vec::new(),
            hinges: Vec::new(),
            gravity,
        }
    }

    /// Number of live bodies.
    pub fn num_bodies(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }

    /// Number of live hinges.
    pub fn num_hinges(&self) -> usize {
        self.hinges.iter().filter(|h| h.is_some()).count()
    }

    /// Name the body was created with.
    pub fn body_name(&self, id: BodyId) -> &str {
        &self.body(id.0).name
    }

    fn body(&self, idx: usize) -> &Body {
        match self.bodies.get(idx).and_then(Option::as_ref) {
            Some(b) => b,
            None => raise_error!("Unknown body handle {}", idx)
        }
    }

    fn body_mut(&mut self, idx: usize) -> &mut Body {
        match self.bodies.get_mut(idx).and_then(Option::as_mut) {
            Some(b) => b,
            None => raise_error!("Unknown body handle {}", idx)
        }
    }

    fn hinge(&self, idx: usize) -> &Hinge {
        match self.hinges.get(idx).and_then(Option::as_ref) {
            Some(h) => h,
            None => raise_error!("Unknown hinge handle {}", idx)
        }
    }

    fn hinge_mut(&mut self, idx: usize) -> &mut Hinge {
        match self.hinges.get_mut(idx).and_then(Option::as_mut) {
            Some(h) => h,
            None => raise_error!("Unknown hinge handle {}", idx)
        }
    }

    fn gravity_vector(&self) -> Vector3<f64> {
        if self.gravity {
            Vector3::new(0.0, 0.0, -GRAVITY_MS2)
        }
        else {
            Vector3::zeros()
        }
    }

    fn step_free_body(body: &mut Body, gravity: &Vector3<f64>, dt: f64) {
        let accel = gravity + body.force / body.mass.max(MIN_INERTIA);
        body.state.linear_velocity += accel * dt;
        body.state.position += body.state.linear_velocity * dt;

        // Ground plane
        let floor = 0.5 * body.size.z;
        if body.state.position.z < floor {
            body.state.position.z = floor;
            if body.state.linear_velocity.z < 0.0 {
                body.state.linear_velocity.z = 0.0;
            }
        }
    }

    fn step_hinge(&mut self, idx: usize, gravity: &Vector3<f64>, dt: f64) {
        let hinge = self.hinge(idx);
        let parent = self.body(hinge.body1).state;
        let child = self.body(hinge.body2);

        if child.fixed || child.is_static {
            self.hinge_mut(idx).rate = 0.0;
            return;
        }

        let axis = (parent.quaternion * hinge.axis_local).into_inner();
        let anchor = parent.position + parent.quaternion * hinge.anchor_local;
        let lever = child.state.position - anchor;

        // Torques about the hinge axis which don't come from the motor
        let load = gravity * child.mass + child.force;
        let free_torque = lever.cross(&load).dot(&axis) + hinge.motor_torque;

        // The velocity motor uses as much torque as it is allowed to reach its target
        let motor = if hinge.motor_fmax > 0.0 {
            let required = hinge.inertia * (hinge.motor_velocity - hinge.rate) / dt - free_torque;
            util::maths::clip(required, hinge.motor_fmax)
        }
        else {
            0.0
        };

        let hinge = self.hinge_mut(idx);
        hinge.rate += (free_torque + motor) / hinge.inertia * dt;
        hinge.angle += hinge.rate * dt;

        if let Some((lo, hi)) = hinge.stops {
            if hinge.angle < lo {
                hinge.angle = lo;
                hinge.rate = hinge.rate.max(0.0);
            }
            else if hinge.angle > hi {
                hinge.angle = hi;
                hinge.rate = hinge.rate.min(0.0);
            }
        }

        self.update_child_pose(idx);
    }

    /// Recalculate the child's state from the parent's state and the hinge angle.
    fn update_child_pose(&mut self, idx: usize) {
        let hinge = self.hinge(idx);
        let parent = self.body(hinge.body1).state;

        let turn = UnitQuaternion::from_axis_angle(&hinge.axis_local, hinge.angle);
        let axis = parent.quaternion * hinge.axis_local;
        let anchor = parent.position + parent.quaternion * hinge.anchor_local;

        let quaternion = parent.quaternion * turn * hinge.child_rest;
        let position = anchor + parent.quaternion * (turn * hinge.child_offset_local);
        let angular_velocity = parent.angular_velocity + axis.into_inner() * hinge.rate;
        let linear_velocity = parent.linear_velocity
            + parent.angular_velocity.cross(&(anchor - parent.position))
            + angular_velocity.cross(&(position - anchor));

        let body2 = hinge.body2;
        let child = self.body_mut(body2);
        child.state = BodyState {
            position,
            rotation: quaternion.to_rotation_matrix().into_inner(),
            quaternion,
            linear_velocity,
            angular_velocity,
        };
    }
}

impl PhysicsBackend for SimpleWorld {
    fn step(&mut self, dt: f64) {
        let gravity = self.gravity_vector();

        for body in self.bodies.iter_mut().flatten() {
            if !(body.is_static || body.fixed) && body.parent_hinge.is_none() {
                Self::step_free_body(body, &gravity, dt);
            }
        }

        // Hinges are stepped in creation order, which puts parents before children
        for idx in 0..self.hinges.len() {
            if self.hinges[idx].is_some() {
                self.step_hinge(idx, &gravity, dt);
            }
        }

        for body in self.bodies.iter_mut().flatten() {
            body.force = Vector3::zeros();
        }
        for hinge in self.hinges.iter_mut().flatten() {
            hinge.motor_torque = 0.0;
        }
    }

    fn set_gravity(&mut self, enabled: bool) {
        self.gravity = enabled;
    }

    fn gravity_enabled(&self) -> bool {
        self.gravity
    }

    fn create_body(&mut self, desc: &BodyDesc) -> BodyId {
        let mass = if desc.mass_kg > 0.0 {
            desc.mass_kg
        }
        else {
            desc.density * desc.size.x * desc.size.y * desc.size.z
        };

        let quaternion = UnitQuaternion::identity();

        self.bodies.push(Some(Body {
            name: desc.name.clone(),
            size: desc.size,
            mass,
            is_static: desc.is_static,
            fixed: false,
            state: BodyState {
                position: desc.position,
                rotation: quaternion.to_rotation_matrix().into_inner(),
                quaternion,
                linear_velocity: Vector3::zeros(),
                angular_velocity: Vector3::zeros(),
            },
            force: Vector3::zeros(),
            parent_hinge: None,
        }));

        trace!("Created body {} '{}' ({:.3} kg)", self.bodies.len() - 1, desc.name, mass);

        BodyId(self.bodies.len() - 1)
    }

    fn destroy_body(&mut self, id: BodyId) {
        // Check the handle is live
        let _ = self.body(id.0);

        // Hinges can't outlive their bodies
        for slot in self.hinges.iter_mut() {
            if let Some(h) = slot {
                if h.body1 == id.0 || h.body2 == id.0 {
                    let child = h.body2;
                    *slot = None;
                    if let Some(Some(b)) = self.bodies.get_mut(child) {
                        b.parent_hinge = None;
                    }
                }
            }
        }

        self.bodies[id.0] = None;
        trim_slots(&mut self.bodies);
        trim_slots(&mut self.hinges);
    }

    fn body_state(&self, id: BodyId) -> BodyState {
        self.body(id.0).state
    }

    fn set_body_state(&mut self, id: BodyId, state: &BodyState) {
        let body = self.body_mut(id.0);
        body.state = *state;
        let parent_hinge = body.parent_hinge;

        // Recover the hinge coordinate from the new pose of the child
        if let Some(h) = parent_hinge {
            let hinge = self.hinge(h);
            let parent = self.body(hinge.body1).state;

            let relative = parent.quaternion.inverse() * state.quaternion * hinge.child_rest.inverse();
            let angle = relative.scaled_axis().dot(&hinge.axis_local.into_inner());
            let rate = (state.angular_velocity - parent.angular_velocity)
                .dot(&(parent.quaternion * hinge.axis_local).into_inner());

            let hinge = self.hinge_mut(h);
            hinge.angle = angle;
            hinge.rate = rate;
        }
    }

    fn body_mass(&self, id: BodyId) -> f64 {
        self.body(id.0).mass
    }

    fn add_force(&mut self, id: BodyId, force: Vector3<f64>) {
        self.body_mut(id.0).force += force;
    }

    fn is_fixed(&self, id: BodyId) -> bool {
        self.body(id.0).fixed
    }

    fn set_fixed(&mut self, id: BodyId, fixed: bool) {
        let body = self.body_mut(id.0);
        body.fixed = fixed;
        if fixed {
            body.state.linear_velocity = Vector3::zeros();
            body.state.angular_velocity = Vector3::zeros();
        }
    }

    fn create_hinge(&mut self, desc: &HingeDesc) -> JointId {
        let parent = self.body(desc.body1.0).state;
        let child = self.body(desc.body2.0);
        let child_state = child.state;

        let to_local = parent.quaternion.inverse();
        let anchor = child_state.position + desc.anchor_offset;
        let child_offset_local = to_local * (child_state.position - anchor);

        // Thin rod about its end, plus the box's own spread
        let inertia = (child.mass
            * (child_offset_local.norm_squared() + child.size.norm_squared() / 12.0))
            .max(MIN_INERTIA);

        self.hinges.push(Some(Hinge {
            body1: desc.body1.0,
            body2: desc.body2.0,
            anchor_local: to_local * (anchor - parent.position),
            axis_local: Unit::new_normalize(to_local * desc.axis),
            child_offset_local,
            child_rest: to_local * child_state.quaternion,
            angle: 0.0,
            rate: 0.0,
            inertia,
            stops: None,
            motor_velocity: 0.0,
            motor_fmax: 0.0,
            motor_torque: 0.0,
        }));

        let idx = self.hinges.len() - 1;
        self.body_mut(desc.body2.0).parent_hinge = Some(idx);

        JointId(idx)
    }

    fn destroy_hinge(&mut self, id: JointId) {
        let body2 = self.hinge(id.0).body2;
        if let Some(Some(b)) = self.bodies.get_mut(body2) {
            b.parent_hinge = None;
        }
        self.hinges[id.0] = None;
        trim_slots(&mut self.hinges);
    }

    fn set_hinge_stops(&mut self, id: JointId, stops: Option<(f64, f64)>) {
        self.hinge_mut(id.0).stops = stops;
    }

    fn hinge_angle(&self, id: JointId) -> f64 {
        let angle = self.hinge(id.0).angle;
        angle.sin().atan2(angle.cos())
    }

    fn hinge_rate(&self, id: JointId) -> f64 {
        self.hinge(id.0).rate
    }

    fn motor_angle(&self, id: JointId) -> f64 {
        self.hinge_angle(id)
    }

    fn set_motor_velocity(&mut self, id: JointId, velocity: f64) {
        self.hinge_mut(id.0).motor_velocity = velocity;
    }

    fn set_motor_fmax(&mut self, id: JointId, fmax: f64) {
        self.hinge_mut(id.0).motor_fmax = fmax.max(0.0);
    }

    fn add_motor_torque(&mut self, id: JointId, torque: f64) {
        self.hinge_mut(id.0).motor_torque += torque;
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Drop freed slots from the end so that rebuilding the world doesn't grow it.
///
/// Slots in the middle are kept so that hinges stay in creation order.
fn trim_slots<T>(slots: &mut Vec<Option<T>>) {
    while let Some(None) = slots.last() {
        slots.pop();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
