pub mod training_controller;
