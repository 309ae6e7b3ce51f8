// handlers/mod.rs - three security tiers
//
// public    no authentication           /auth/*
// protected JWT + resolved tenant       /api/*
// elevated  superadmin session          /api/root/*

pub mod elevated;
pub mod protected;
pub mod public;
