mod reports;
mod sweep;
