macro_rules! emit {
    ($self:expr) => {
        writeln!($self.output)
    };

    ($self:expr, $($format:tt)*) => {{
        write!($self.output, "{:indent$}", "", indent = 4 * $self.depth)?;
        writeln!($self.output, $($format)*)
    }};
}
