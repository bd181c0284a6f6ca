mod code;
mod logger;
mod position;
