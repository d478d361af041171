mod tests_callbacks;
