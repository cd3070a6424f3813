mod arbitration;
mod properties;
mod registration;
mod scheduling;
mod spikes;
