mod common;
mod sequence;
