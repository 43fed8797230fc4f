mod categories;
mod controls;
mod details;
mod panels;
