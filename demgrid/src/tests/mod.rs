mod minmax_properties;
mod volcanic_cone;
