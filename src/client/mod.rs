//! client-side (_initiator_) main loop

mod main_loop;

pub use main_loop::run;
