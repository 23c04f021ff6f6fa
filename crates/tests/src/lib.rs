
#[cfg(test)]
mod discussion_tests;
#[cfg(test)]
mod post_tests;
#[cfg(test)]
mod invitation_tests;
#[cfg(test)]
mod billing_tests;
#[cfg(test)]
mod client_tests;
